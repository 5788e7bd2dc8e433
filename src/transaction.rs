//! Atomic creation of a layer's metadata.
//!
//! A [`Transaction`] stages each field as its own file in a [`WriteSet`].  Nothing is visible to
//! readers of the store until [`Transaction::commit`] renames the staged directory onto the
//! layer's canonical location, at which point every staged field appears at once.
//!
//! ```no_run
//! # fn main() -> layerdb::Result<()> {
//! use layerdb::{ChainId, DiffId, FileMetadataStore};
//!
//! let store = FileMetadataStore::new("/var/lib/layerdb")?;
//! let chain_id: ChainId = "sha256:bb...".parse()?;
//! let diff_id: DiffId = "sha256:aa...".parse()?;
//!
//! let mut tx = store.start_transaction()?;
//! tx.set_size(100)?;
//! tx.set_diff_id(&diff_id)?;
//! tx.set_cache_id("4c5e1a")?;
//! tx.commit(&chain_id)?;
//! # Ok(())
//! # }
//! ```

use std::{
    fmt,
    fs::File,
    io::{self, Write},
    path::PathBuf,
};

use flate2::{write::GzEncoder, Compression};
use log::debug;

use crate::{
    descriptor::Descriptor,
    digest::{ChainId, DiffId},
    error::Result,
    util::ensure_dir_all,
    writeset::{Published, WriteSet},
    FILE_MODE, LAYER_DIR_MODE,
};

pub(crate) const SIZE_FILE: &str = "size";
pub(crate) const PARENT_FILE: &str = "parent";
pub(crate) const DIFF_FILE: &str = "diff";
pub(crate) const CACHE_ID_FILE: &str = "cache-id";
pub(crate) const DESCRIPTOR_FILE: &str = "descriptor.json";
pub(crate) const TAR_SPLIT_FILE: &str = "tar-split.json.gz";

/// A staged set of layer metadata fields awaiting publication.
///
/// Dropping a transaction without committing it discards the staged files, so early returns
/// through `?` never leak staging directories.  [`Transaction::cancel`] does the same but
/// reports cleanup errors.
pub struct Transaction {
    ws: WriteSet,
    root: PathBuf,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("ws", &self.ws)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.ws, f)
    }
}

impl Transaction {
    /// `root` is the store root; staging happens under its `tmp/` directory.
    pub(crate) fn new(ws: WriteSet, root: PathBuf) -> Self {
        Self { ws, root }
    }

    pub fn set_size(&mut self, size: i64) -> Result<()> {
        Ok(self
            .ws
            .write_file(SIZE_FILE, size.to_string().as_bytes(), FILE_MODE)?)
    }

    pub fn set_parent(&mut self, parent: &ChainId) -> Result<()> {
        Ok(self
            .ws
            .write_file(PARENT_FILE, parent.to_string().as_bytes(), FILE_MODE)?)
    }

    pub fn set_diff_id(&mut self, diff: &DiffId) -> Result<()> {
        Ok(self
            .ws
            .write_file(DIFF_FILE, diff.to_string().as_bytes(), FILE_MODE)?)
    }

    /// Record the storage driver's identifier for this layer.
    pub fn set_cache_id(&mut self, cache_id: &str) -> Result<()> {
        Ok(self
            .ws
            .write_file(CACHE_ID_FILE, cache_id.as_bytes(), FILE_MODE)?)
    }

    pub fn set_descriptor(&mut self, descriptor: &Descriptor) -> Result<()> {
        let json = serde_json::to_vec(descriptor)?;
        Ok(self.ws.write_file(DESCRIPTOR_FILE, &json, FILE_MODE)?)
    }

    /// Open a writer for the layer's tar-split log.
    ///
    /// With `compress_input` the written bytes are gzip-compressed on the way to disk; without it
    /// the caller is expected to provide data that is already compressed.  The writer must be
    /// [finished](TarSplitWriter::finish) before the transaction is committed.
    pub fn tar_split_writer(&mut self, compress_input: bool) -> Result<TarSplitWriter> {
        let file = self.ws.file_writer(TAR_SPLIT_FILE, FILE_MODE)?;
        Ok(if compress_input {
            TarSplitWriter::Compressed(GzEncoder::new(file, Compression::default()))
        } else {
            TarSplitWriter::Raw(file)
        })
    }

    /// Atomically publish the staged fields as the metadata of `layer`.
    ///
    /// Chain IDs are content-addressed, so an existing directory for `layer` already holds the
    /// same metadata.  Committing over it succeeds and leaves the existing copy in place.
    pub fn commit(self, layer: &ChainId) -> Result<()> {
        let algorithm_dir = self.root.join(layer.algorithm().as_str());
        ensure_dir_all(&algorithm_dir, LAYER_DIR_MODE)?;

        let staged = self.ws.to_string();
        match self.ws.commit(algorithm_dir.join(layer.encoded()))? {
            Published::Created => debug!("committed {staged} as {layer}"),
            Published::AlreadyPresent => {
                debug!("{layer} already committed, discarded {staged}")
            }
        }
        Ok(())
    }

    /// Discard everything staged so far.  Safe to call after any number of staging operations.
    pub fn cancel(self) -> Result<()> {
        Ok(self.ws.cancel()?)
    }
}

/// Writer for a tar-split log staged inside a [`Transaction`].
pub enum TarSplitWriter {
    Raw(File),
    Compressed(GzEncoder<File>),
}

impl fmt::Debug for TarSplitWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TarSplitWriter::Raw(_) => f.write_str("TarSplitWriter::Raw"),
            TarSplitWriter::Compressed(_) => f.write_str("TarSplitWriter::Compressed"),
        }
    }
}

impl TarSplitWriter {
    /// Flush any pending compressed output and sync the file to disk.
    pub fn finish(self) -> io::Result<()> {
        let file = match self {
            TarSplitWriter::Raw(file) => file,
            TarSplitWriter::Compressed(encoder) => encoder.finish()?,
        };
        file.sync_all()
    }
}

impl Write for TarSplitWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TarSplitWriter::Raw(file) => file.write(buf),
            TarSplitWriter::Compressed(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TarSplitWriter::Raw(file) => file.flush(),
            TarSplitWriter::Compressed(encoder) => encoder.flush(),
        }
    }
}
