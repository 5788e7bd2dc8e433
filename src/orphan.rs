//! Two-phase layer deletion and recovery of interrupted deletions.
//!
//! Deleting a layer happens in two steps.  First the layer directory is renamed to
//! `<encoded>-<random>-removing` ([`FileMetadataStore::mark_for_removal`]), which makes it
//! invisible to lookups and listings.  Once the storage driver has released the layer's data, the
//! marked directory is deleted with [`FileMetadataStore::remove`].
//!
//! If the process dies between the two steps, the marked directory survives.  On the next start
//! [`FileMetadataStore::get_orphans`] reports it together with its cache ID so the driver data
//! can be released and the directory removed; [`FileMetadataStore::cleanup_orphans`] does both.
//!
//! Scanning is best-effort: entries that cannot be parsed or read are logged and skipped, and
//! will be looked at again on the next pass.

use std::{fmt, fs::DirEntry, path::PathBuf};

use log::{debug, error};

use crate::{
    digest::{Algorithm, ChainId, Digest},
    error::{Result, StoreError},
    store::FileMetadataStore,
    transaction::CACHE_ID_FILE,
    util::{generate_random_id, read_trimmed, NotFoundFilter},
    REMOVING_SUFFIX,
};

/// A layer directory left in the pending-removal state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrphanLayer {
    pub chain_id: ChainId,
    pub cache_id: String,
}

impl OrphanLayer {
    pub fn algorithm(&self) -> Algorithm {
        self.chain_id.algorithm()
    }
}

/// Outcome of [`FileMetadataStore::cleanup_orphans`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupResult {
    /// Orphans whose driver data was released and whose directory was removed
    pub removed: u64,
    /// Orphans left in place because releasing their driver data or deleting their directory
    /// failed
    pub failed: u64,
}

/// Entries of `dir` that carry the removal marker, as (name, entry) pairs.
fn removing_entries(dir: PathBuf) -> Result<Vec<(String, DirEntry)>> {
    let Some(entries) = std::fs::read_dir(&dir).filter_not_found()? else {
        return Ok(Vec::new());
    };

    let mut marked = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                error!("reading {}: {err}", dir.display());
                continue;
            }
        };
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.ends_with(REMOVING_SUFFIX) {
            continue;
        }
        match entry.file_type() {
            Ok(file_type) if file_type.is_dir() => marked.push((name, entry)),
            Ok(_) => {}
            Err(err) => error!("stat {}: {err}", entry.path().display()),
        }
    }
    Ok(marked)
}

impl FileMetadataStore {
    /// Hide a committed layer from lookups by renaming it with the removal marker.
    ///
    /// Returns the new location of the layer directory.  The directory still holds the layer's
    /// cache ID, so the deletion can be finished by [`remove`](Self::remove) later, even after a
    /// restart.
    pub fn mark_for_removal(&self, layer: &ChainId) -> Result<PathBuf> {
        let dir = self.layer_dir(layer);
        let marked = self.algorithm_dir(layer.algorithm()).join(format!(
            "{}-{}{REMOVING_SUFFIX}",
            layer.encoded(),
            generate_random_id()
        ));
        std::fs::rename(&dir, &marked)
            .filter_not_found()?
            .ok_or_else(|| StoreError::NotFound {
                what: "layer",
                key: layer.to_string(),
            })?;
        debug!("marked {layer} for removal at {}", marked.display());
        Ok(marked)
    }

    /// Find layer directories whose removal was started but never finished.
    ///
    /// Only marked directories with a valid digest prefix and a non-empty, readable cache ID are
    /// reported.
    pub fn get_orphans(&self) -> Result<Vec<OrphanLayer>> {
        let mut orphans = Vec::new();
        for &algorithm in self.algorithms() {
            for (name, entry) in removing_entries(self.algorithm_dir(algorithm))? {
                // <encoded>-<random>-removing
                let encoded = name.split('-').next().unwrap_or_default();
                let chain_id = match Digest::from_encoded(algorithm, encoded) {
                    Ok(digest) => digest,
                    Err(err) => {
                        debug!("ignoring invalid digest {algorithm}:{encoded}: {err}");
                        continue;
                    }
                };

                let cache_id = match read_trimmed(entry.path().join(CACHE_ID_FILE)).filter_not_found()
                {
                    Ok(Some(cache_id)) => cache_id,
                    Ok(None) => continue,
                    Err(err) => {
                        error!("failed to read cache ID of {chain_id}: {err}");
                        continue;
                    }
                };
                if cache_id.is_empty() {
                    error!("invalid cache ID for orphaned layer {chain_id}");
                    continue;
                }

                orphans.push(OrphanLayer { chain_id, cache_id });
            }
        }
        Ok(orphans)
    }

    /// Delete the removal-marked directories of `layer` that belong to `cache_id`.
    ///
    /// A marked directory whose stored cache ID differs was left by another incarnation of the
    /// same chain ID and is kept.  Failures to delete are logged and left for the next scan;
    /// calling this when nothing matches is a no-op.
    pub fn remove(&self, layer: &ChainId, cache_id: &str) -> Result<()> {
        self.remove_marked(layer, cache_id)?;
        Ok(())
    }

    /// Number of matching marked directories that are gone afterwards.
    fn remove_marked(&self, layer: &ChainId, cache_id: &str) -> Result<usize> {
        let prefix = format!("{}-", layer.encoded());
        let mut removed = 0;
        for (name, entry) in removing_entries(self.algorithm_dir(layer.algorithm()))? {
            if !name.starts_with(&prefix) {
                continue;
            }

            let dir = entry.path();
            let stored = match read_trimmed(dir.join(CACHE_ID_FILE)) {
                Ok(stored) => stored,
                Err(err) => {
                    error!("cannot get cache ID of {}: {err}", dir.display());
                    continue;
                }
            };
            if stored != cache_id {
                continue;
            }

            debug!("removing {}", dir.display());
            match std::fs::remove_dir_all(&dir).filter_not_found() {
                Ok(_) => removed += 1,
                Err(err) => error!("cannot remove {name}: {err}"),
            }
        }
        Ok(removed)
    }

    /// Finish every interrupted deletion.
    ///
    /// For each orphan, `release` is asked to free the storage driver's data for its cache ID.
    /// When that succeeds the marked directory is removed; when it fails the orphan is kept for a
    /// later pass.
    pub fn cleanup_orphans<F, E>(&self, mut release: F) -> Result<CleanupResult>
    where
        F: FnMut(&OrphanLayer) -> std::result::Result<(), E>,
        E: fmt::Display,
    {
        let mut result = CleanupResult::default();
        for orphan in self.get_orphans()? {
            if let Err(err) = release(&orphan) {
                error!(
                    "cannot release driver data {} of orphaned layer {}: {err}",
                    orphan.cache_id, orphan.chain_id
                );
                result.failed += 1;
                continue;
            }
            if self.remove_marked(&orphan.chain_id, &orphan.cache_id)? == 0 {
                result.failed += 1;
            } else {
                result.removed += 1;
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::test::{digest, store};

    fn commit_with_cache_id(store: &FileMetadataStore, chain_id: &ChainId, cache_id: &str) {
        let mut tx = store.start_transaction().unwrap();
        tx.set_size(1).unwrap();
        tx.set_diff_id(&digest(0xff)).unwrap();
        tx.set_cache_id(cache_id).unwrap();
        tx.commit(chain_id).unwrap();
    }

    fn make_marked(store: &FileMetadataStore, name: &str, cache_id: Option<&str>) -> PathBuf {
        let dir = store.root().join("sha256").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        if let Some(cache_id) = cache_id {
            std::fs::write(dir.join("cache-id"), cache_id).unwrap();
        }
        dir
    }

    #[test]
    fn test_orphan_scan_and_remove() {
        let (_tmp, store) = store();
        let chain_id = digest(0x12);
        let dir = make_marked(
            &store,
            &format!("{}-xyz-removing", chain_id.encoded()),
            Some("abc"),
        );

        assert_eq!(
            store.get_orphans().unwrap(),
            vec![OrphanLayer {
                chain_id: chain_id.clone(),
                cache_id: "abc".into()
            }]
        );

        store.remove(&chain_id, "abc").unwrap();
        assert!(!dir.exists());
        assert!(store.get_orphans().unwrap().is_empty());

        // idempotent
        store.remove(&chain_id, "abc").unwrap();
    }

    #[test]
    fn test_orphan_scan_filters() {
        let (_tmp, store) = store();
        commit_with_cache_id(&store, &digest(0x01), "live");
        make_marked(&store, "nothex-abc-removing", Some("c1"));
        make_marked(
            &store,
            &format!("{}-abc-removing", digest(0x02).encoded()),
            None,
        );
        make_marked(
            &store,
            &format!("{}-abc-removing", digest(0x03).encoded()),
            Some(" \n"),
        );
        let unreadable = make_marked(
            &store,
            &format!("{}-abc-removing", digest(0x06).encoded()),
            None,
        );
        std::fs::create_dir(unreadable.join("cache-id")).unwrap();
        make_marked(
            &store,
            &format!("{}-abc-deleting", digest(0x04).encoded()),
            Some("c4"),
        );
        std::fs::write(
            store
                .root()
                .join("sha256")
                .join(format!("{}-abc-removing", digest(0x05).encoded())),
            "not a directory",
        )
        .unwrap();

        assert!(store.get_orphans().unwrap().is_empty());
    }

    #[test]
    fn test_orphan_scan_without_layers() {
        let (_tmp, store) = store();
        assert!(store.get_orphans().unwrap().is_empty());
        store.remove(&digest(0x01), "anything").unwrap();
    }

    #[test]
    fn test_remove_checks_cache_id() {
        let (_tmp, store) = store();
        let chain_id = digest(0x20);
        let stale = make_marked(
            &store,
            &format!("{}-one-removing", chain_id.encoded()),
            Some("old"),
        );
        let current = make_marked(
            &store,
            &format!("{}-two-removing", chain_id.encoded()),
            Some("new"),
        );

        store.remove(&chain_id, "new").unwrap();
        assert!(stale.exists());
        assert!(!current.exists());
    }

    #[test]
    fn test_remove_ignores_live_layer() {
        let (_tmp, store) = store();
        let chain_id = digest(0x21);
        commit_with_cache_id(&store, &chain_id, "live");

        store.remove(&chain_id, "live").unwrap();
        assert_eq!(store.get_cache_id(&chain_id).unwrap(), "live");
    }

    #[test]
    fn test_mark_for_removal() {
        let (_tmp, store) = store();
        let chain_id = digest(0x30);
        commit_with_cache_id(&store, &chain_id, "cache-30");

        let marked = store.mark_for_removal(&chain_id).unwrap();
        let name = marked.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with(chain_id.encoded()));
        assert!(name.ends_with("-removing"));

        // invisible to lookups and listing, visible to the scan
        assert!(store.get_cache_id(&chain_id).unwrap_err().is_not_found());
        assert!(store.list().unwrap().0.is_empty());
        assert_eq!(
            store.get_orphans().unwrap(),
            vec![OrphanLayer {
                chain_id: chain_id.clone(),
                cache_id: "cache-30".into()
            }]
        );

        assert!(store.mark_for_removal(&chain_id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_recreated_layer_survives_stale_removal() {
        let (_tmp, store) = store();
        let chain_id = digest(0x31);
        commit_with_cache_id(&store, &chain_id, "first");
        let first = store.mark_for_removal(&chain_id).unwrap();
        commit_with_cache_id(&store, &chain_id, "second");
        let second = store.mark_for_removal(&chain_id).unwrap();

        store.remove(&chain_id, "first").unwrap();
        assert!(!first.exists());
        assert!(second.exists());
    }

    #[test]
    fn test_cleanup_orphans() {
        let (_tmp, store) = store();
        for (byte, cache_id) in [(0x40, "keep-me"), (0x41, "drop-me"), (0x42, "drop-me-too")] {
            commit_with_cache_id(&store, &digest(byte), cache_id);
            store.mark_for_removal(&digest(byte)).unwrap();
        }

        let mut released = Vec::new();
        let result = store
            .cleanup_orphans(|orphan| {
                if orphan.cache_id == "keep-me" {
                    return Err("device busy");
                }
                released.push(orphan.cache_id.clone());
                Ok(())
            })
            .unwrap();

        assert_eq!(
            result,
            CleanupResult {
                removed: 2,
                failed: 1
            }
        );
        released.sort();
        assert_eq!(released, vec!["drop-me", "drop-me-too"]);

        let left = store.get_orphans().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].cache_id, "keep-me");
        assert_eq!(left[0].algorithm(), Algorithm::Sha256);
    }

    #[test]
    fn test_cleanup_counts_only_deleted() {
        let (_tmp, store) = store();
        let chain_id = digest(0x50);
        commit_with_cache_id(&store, &chain_id, "original");
        let marked = store.mark_for_removal(&chain_id).unwrap();

        // the directory is reused by another owner while its driver data is released
        let result = store
            .cleanup_orphans(|_| std::fs::write(marked.join("cache-id"), "reused"))
            .unwrap();

        assert_eq!(
            result,
            CleanupResult {
                removed: 0,
                failed: 1
            }
        );
        assert!(marked.exists());
    }
}
