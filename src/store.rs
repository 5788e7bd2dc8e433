//! Point lookups and enumeration of committed layers.
//!
//! Every getter re-reads the relevant file from disk.  Optional fields (parent, descriptor) read
//! as empty values when their file is absent; mandatory fields (size, diff ID, cache ID,
//! tar-split) report [`StoreError::NotFound`].

use std::{
    fmt,
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use log::{debug, error};

use crate::{
    config::StoreConfig,
    descriptor::Descriptor,
    digest::{Algorithm, ChainId, DiffId, Digest},
    error::{Result, StoreError},
    transaction::{
        Transaction, CACHE_ID_FILE, DESCRIPTOR_FILE, DIFF_FILE, PARENT_FILE, SIZE_FILE,
        TAR_SPLIT_FILE,
    },
    util::{ensure_dir_all, read_trimmed, NotFoundFilter},
    writeset::WriteSet,
    LAYER_DIR_MODE, ROOT_DIR_MODE, TMP_DIR,
};

/// Layer metadata store backed by plain files under a root directory.
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    root: PathBuf,
    algorithms: Vec<Algorithm>,
}

/// Everything recorded about one committed layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerMetadata {
    pub chain_id: ChainId,
    pub size: i64,
    /// `None` for a base layer.
    pub parent: Option<ChainId>,
    pub diff_id: DiffId,
    pub cache_id: String,
    pub descriptor: Descriptor,
    pub has_tar_split: bool,
}

impl FileMetadataStore {
    /// Open the store at `root`, creating the directory (owner-only) if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        ensure_dir_all(&root, ROOT_DIR_MODE)?;
        Ok(Self {
            root,
            algorithms: Algorithm::DEFAULT_SUPPORTED.to_vec(),
        })
    }

    /// Open the store described by `config`, scanning its configured digest algorithms.
    pub fn with_config(config: &StoreConfig) -> Result<Self> {
        let mut store = Self::new(&config.root)?;
        store.algorithms = config.algorithms.clone();
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Digest algorithms whose directories are enumerated by [`list`](Self::list) and orphan
    /// scans.
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    pub(crate) fn algorithm_dir(&self, algorithm: Algorithm) -> PathBuf {
        self.root.join(algorithm.as_str())
    }

    pub(crate) fn layer_dir(&self, layer: &ChainId) -> PathBuf {
        self.algorithm_dir(layer.algorithm()).join(layer.encoded())
    }

    fn layer_file(&self, layer: &ChainId, filename: &str) -> PathBuf {
        self.layer_dir(layer).join(filename)
    }

    fn read_layer_file(&self, layer: &ChainId, filename: &str) -> Result<Option<String>> {
        Ok(read_trimmed(self.layer_file(layer, filename)).filter_not_found()?)
    }

    fn require_layer_file(
        &self,
        layer: &ChainId,
        filename: &str,
        what: &'static str,
    ) -> Result<String> {
        self.read_layer_file(layer, filename)?
            .ok_or_else(|| StoreError::NotFound {
                what,
                key: layer.to_string(),
            })
    }

    /// Allocate a staging area for creating a new layer.
    pub fn start_transaction(&self) -> Result<Transaction> {
        let tmp_dir = self.root.join(TMP_DIR);
        ensure_dir_all(&tmp_dir, LAYER_DIR_MODE)?;
        let ws = WriteSet::new_in(&tmp_dir)?;
        Ok(Transaction::new(ws, self.root.clone()))
    }

    pub fn get_size(&self, layer: &ChainId) -> Result<i64> {
        let content = self.require_layer_file(layer, SIZE_FILE, "size")?;
        content
            .parse()
            .map_err(|err| StoreError::InvalidSize(format!("{layer}: {content:?}: {err}")))
    }

    /// The layer's parent, or `None` for a base layer.
    pub fn get_parent(&self, layer: &ChainId) -> Result<Option<ChainId>> {
        self.read_layer_file(layer, PARENT_FILE)?
            .map(|content| content.parse())
            .transpose()
    }

    pub fn get_diff_id(&self, layer: &ChainId) -> Result<DiffId> {
        self.require_layer_file(layer, DIFF_FILE, "diff id")?
            .parse()
    }

    /// The storage driver's identifier for the layer.  An empty cache-id file is reported as
    /// [`StoreError::InvalidCacheId`].
    pub fn get_cache_id(&self, layer: &ChainId) -> Result<String> {
        let content = self.require_layer_file(layer, CACHE_ID_FILE, "cache id")?;
        if content.is_empty() {
            return Err(StoreError::InvalidCacheId(layer.clone()));
        }
        Ok(content)
    }

    /// The layer's distribution descriptor, or the zero value if none was recorded.
    pub fn get_descriptor(&self, layer: &ChainId) -> Result<Descriptor> {
        match std::fs::read(self.layer_file(layer, DESCRIPTOR_FILE)).filter_not_found()? {
            Some(content) => Ok(serde_json::from_slice(&content)?),
            None => Ok(Descriptor::default()),
        }
    }

    /// Open the layer's tar-split log for reading.  The returned reader decompresses on the fly
    /// and closes the file when dropped.
    pub fn tar_split_reader(&self, layer: &ChainId) -> Result<TarSplitReader> {
        let file = File::open(self.layer_file(layer, TAR_SPLIT_FILE))
            .filter_not_found()?
            .ok_or_else(|| StoreError::NotFound {
                what: "tar-split",
                key: layer.to_string(),
            })?;
        Ok(TarSplitReader {
            decoder: GzDecoder::new(BufReader::new(file)),
        })
    }

    /// Read every recorded field of a committed layer.
    pub fn get_layer_metadata(&self, layer: &ChainId) -> Result<LayerMetadata> {
        Ok(LayerMetadata {
            chain_id: layer.clone(),
            size: self.get_size(layer)?,
            parent: self.get_parent(layer)?,
            diff_id: self.get_diff_id(layer)?,
            cache_id: self.get_cache_id(layer)?,
            descriptor: self.get_descriptor(layer)?,
            has_tar_split: self.layer_file(layer, TAR_SPLIT_FILE).try_exists()?,
        })
    }

    /// Enumerate committed layers and known mounts.
    ///
    /// Directory names that are not valid digests, including layers pending removal, are
    /// skipped.  Unreadable entries are logged and skipped rather than failing the listing.
    pub fn list(&self) -> Result<(Vec<ChainId>, Vec<String>)> {
        let mut ids = Vec::new();
        for &algorithm in &self.algorithms {
            let Some(entries) = std::fs::read_dir(self.algorithm_dir(algorithm)).filter_not_found()?
            else {
                continue;
            };

            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        error!("reading {algorithm} layer directory: {err}");
                        continue;
                    }
                };
                match entry.file_type() {
                    Ok(file_type) if file_type.is_dir() => {}
                    Ok(_) => continue,
                    Err(err) => {
                        error!("stat {}: {err}", entry.path().display());
                        continue;
                    }
                }

                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    debug!("ignoring non-UTF-8 entry {name:?} in {algorithm} layers");
                    continue;
                };
                match Digest::from_encoded(algorithm, name) {
                    Ok(digest) => ids.push(digest),
                    Err(err) => debug!("ignoring invalid digest {algorithm}:{name}: {err}"),
                }
            }
        }
        ids.sort();

        let mounts = self.list_mounts()?;
        Ok((ids, mounts))
    }
}

/// Decompressing reader over a stored tar-split log.
pub struct TarSplitReader {
    decoder: GzDecoder<BufReader<File>>,
}

impl fmt::Debug for TarSplitReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarSplitReader").finish_non_exhaustive()
    }
}

impl Read for TarSplitReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(buf)
    }
}
