//! Staged write-sets published with a single rename.
//!
//! A [`WriteSet`] is a private directory under the store's `tmp/` area.  Files are written into
//! it one by one, and nothing is visible to readers until [`WriteSet::commit`] renames the whole
//! directory onto its final location.  Because rename(2) is atomic, readers either see no
//! directory at all or a directory holding every staged file.
//!
//! If a write-set is dropped without being committed, its directory is removed.

use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{Error, ErrorKind, Result, Write},
    os::unix::fs::OpenOptionsExt,
    path::Path,
};

use log::trace;
use rustix::{
    fs::{renameat, renameat_with, RenameFlags, CWD},
    io::Errno,
};
use tempfile::TempDir;

use crate::util::ErrnoFilter;

/// What happened when a write-set was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    /// The staged directory now lives at the target path.
    Created,
    /// The target already existed; the staged copy was discarded.
    AlreadyPresent,
}

/// A staging directory whose contents are published atomically.
pub struct WriteSet {
    dir: TempDir,
}

impl fmt::Debug for WriteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSet")
            .field("path", &self.dir.path())
            .finish()
    }
}

impl fmt::Display for WriteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir.path().display())
    }
}

impl WriteSet {
    /// Allocate a fresh staging directory inside `tmp_dir`, which must already exist.
    pub fn new_in(tmp_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("write-set-")
            .tempdir_in(tmp_dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a complete file into the write-set and flush it to disk.
    pub fn write_file(&self, name: &str, data: &[u8], mode: u32) -> Result<()> {
        let mut file = self.file_writer(name, mode)?;
        file.write_all(data)?;
        file.sync_all()
    }

    /// Open a file in the write-set for streaming writes, truncating any earlier content.
    ///
    /// The caller should `sync_all()` the file once everything has been written.
    pub fn file_writer(&self, name: &str, mode: u32) -> Result<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(self.dir.path().join(name))
    }

    /// Publish the staged directory at `target`.
    ///
    /// The parent of `target` must exist.  An existing `target` is never replaced: in that case
    /// the staged files are discarded and [`Published::AlreadyPresent`] is returned.
    pub fn commit(self, target: impl AsRef<Path>) -> Result<Published> {
        let target = target.as_ref();
        let staged = self.dir.path();

        let renamed = match renameat_with(CWD, staged, CWD, target, RenameFlags::NOREPLACE) {
            // Filesystems without RENAME_NOREPLACE: a plain rename still refuses to replace a
            // non-empty directory.
            Err(Errno::INVAL) => renameat(CWD, staged, CWD, target).filter_errno(Errno::NOTEMPTY),
            other => other.filter_errno(Errno::EXIST),
        };

        match renamed {
            Ok(Some(())) => {
                trace!("published {} at {}", staged.display(), target.display());
                // The staging path is gone now, so dropping the TempDir has nothing to remove.
                Ok(Published::Created)
            }
            Ok(None) | Err(Errno::EXIST) => {
                if !std::fs::symlink_metadata(target)?.is_dir() {
                    return Err(Error::new(
                        ErrorKind::AlreadyExists,
                        format!("{} exists and is not a directory", target.display()),
                    ));
                }
                self.dir.close()?;
                Ok(Published::AlreadyPresent)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Discard the staged files.
    pub fn cancel(self) -> Result<()> {
        self.dir.close()
    }
}
