//! Per-container mount tracking.
//!
//! Each mount is a directory `mounts/<name>/` holding up to three files: `mount-id` (the storage
//! driver's ID for the read-write layer), `init-id` (the driver's ID for the init layer, if any)
//! and `parent` (the chain ID the mount is based on).
//!
//! The three setters are independent: each replaces exactly one file, atomically, but nothing
//! ties them together.  A crash between `set_mount_id` and `set_mount_parent` leaves a mount with
//! an ID and no parent; readers treat the missing parent as a mount with no base layer.

use std::{fs::Permissions, io::Write, os::unix::fs::PermissionsExt, path::PathBuf};

use log::{debug, error};
use tempfile::NamedTempFile;

use crate::{
    digest::ChainId,
    error::{Result, StoreError},
    id::is_valid_id,
    store::FileMetadataStore,
    util::{ensure_dir_all, read_trimmed, NotFoundFilter},
    FILE_MODE, LAYER_DIR_MODE, MOUNTS_DIR,
};

const MOUNT_ID_FILE: &str = "mount-id";
const INIT_ID_FILE: &str = "init-id";
const PARENT_FILE: &str = "parent";

/// Everything recorded about one mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountMetadata {
    pub name: String,
    pub mount_id: String,
    pub init_id: Option<String>,
    pub parent: Option<ChainId>,
}

fn validate_mount_name(mount: &str) -> Result<()> {
    if mount.is_empty() || mount == "." || mount == ".." || mount.contains(['/', '\0']) {
        return Err(StoreError::InvalidMountName(mount.to_string()));
    }
    Ok(())
}

impl FileMetadataStore {
    fn mounts_dir(&self) -> PathBuf {
        self.root().join(MOUNTS_DIR)
    }

    fn mount_dir(&self, mount: &str) -> Result<PathBuf> {
        validate_mount_name(mount)?;
        Ok(self.mounts_dir().join(mount))
    }

    fn read_mount_file(&self, mount: &str, filename: &str) -> Result<Option<String>> {
        let path = self.mount_dir(mount)?.join(filename);
        Ok(read_trimmed(path).filter_not_found()?)
    }

    /// Replace one file of a mount, creating the mount directory if needed.
    fn write_mount_file(&self, mount: &str, filename: &str, content: &str) -> Result<()> {
        let dir = self.mount_dir(mount)?;
        ensure_dir_all(&dir, LAYER_DIR_MODE)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file()
            .set_permissions(Permissions::from_mode(FILE_MODE))?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(filename)).map_err(|err| err.error)?;
        Ok(())
    }

    pub fn set_mount_id(&self, mount: &str, mount_id: &str) -> Result<()> {
        self.write_mount_file(mount, MOUNT_ID_FILE, mount_id)
    }

    pub fn set_init_id(&self, mount: &str, init_id: &str) -> Result<()> {
        self.write_mount_file(mount, INIT_ID_FILE, init_id)
    }

    pub fn set_mount_parent(&self, mount: &str, parent: &ChainId) -> Result<()> {
        self.write_mount_file(mount, PARENT_FILE, &parent.to_string())
    }

    /// The storage driver's ID for the mount.  Content that is not a well-formed ID is rejected.
    pub fn get_mount_id(&self, mount: &str) -> Result<String> {
        let content =
            self.read_mount_file(mount, MOUNT_ID_FILE)?
                .ok_or_else(|| StoreError::NotFound {
                    what: "mount id",
                    key: mount.to_string(),
                })?;
        if !is_valid_id(&content) {
            return Err(StoreError::InvalidMountId(mount.to_string()));
        }
        Ok(content)
    }

    /// The mount's init layer ID, if one was recorded.
    pub fn get_init_id(&self, mount: &str) -> Result<Option<String>> {
        match self.read_mount_file(mount, INIT_ID_FILE)? {
            Some(content) if !is_valid_id(&content) => {
                Err(StoreError::InvalidInitId(mount.to_string()))
            }
            other => Ok(other),
        }
    }

    /// The chain ID the mount is based on, if one was recorded.
    pub fn get_mount_parent(&self, mount: &str) -> Result<Option<ChainId>> {
        self.read_mount_file(mount, PARENT_FILE)?
            .map(|content| content.parse())
            .transpose()
    }

    pub fn get_mount_metadata(&self, mount: &str) -> Result<MountMetadata> {
        Ok(MountMetadata {
            name: mount.to_string(),
            mount_id: self.get_mount_id(mount)?,
            init_id: self.get_init_id(mount)?,
            parent: self.get_mount_parent(mount)?,
        })
    }

    /// Delete a mount and everything recorded for it.  Removing an unknown mount is not an error.
    pub fn remove_mount(&self, mount: &str) -> Result<()> {
        std::fs::remove_dir_all(self.mount_dir(mount)?).filter_not_found()?;
        Ok(())
    }

    /// Names of all mounts, sorted.
    pub(crate) fn list_mounts(&self) -> Result<Vec<String>> {
        let Some(entries) = std::fs::read_dir(self.mounts_dir()).filter_not_found()? else {
            return Ok(Vec::new());
        };

        let mut mounts = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    error!("reading mounts directory: {err}");
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

            match entry.file_name().into_string() {
                Ok(name) => mounts.push(name),
                Err(name) => debug!("ignoring non-UTF-8 mount {name:?}"),
            }
        }
        mounts.sort();
        Ok(mounts)
    }
}
