//! Filesystem-backed layer metadata store.
//!
//! This crate records, for every content-addressed image layer, the metadata the layer graph
//! needs to rebuild itself after a restart: the parent chain ID, the layer's size and diff ID,
//! the storage driver's cache ID, an optional distribution descriptor and an optional tar-split
//! log.  It also tracks container mounts (read-write layers) by name.
//!
//! # Store Layout
//!
//! ```text
//! <root>/
//! ├── sha256/
//! │   ├── <encoded-chain-id>/
//! │   │   ├── size                  # decimal byte count
//! │   │   ├── parent                # "sha256:<hex>", absent for base layers
//! │   │   ├── diff                  # "sha256:<hex>"
//! │   │   ├── cache-id              # storage driver token
//! │   │   ├── descriptor.json       # optional
//! │   │   └── tar-split.json.gz     # optional
//! │   └── <encoded-chain-id>-<random>-removing/   # pending deletion
//! ├── mounts/
//! │   └── <mount-name>/
//! │       ├── mount-id
//! │       ├── init-id
//! │       └── parent
//! └── tmp/                          # transaction staging
//! ```
//!
//! # Crash Safety
//!
//! Layers are created through a [`Transaction`], which stages every file in a private directory
//! under `tmp/` and publishes it with one rename.  Deletion is two-phase: the layer directory is
//! first renamed with a `-removing` suffix, which hides it from lookups, and later deleted by
//! [`FileMetadataStore::remove`] once the storage driver data is gone.  Directories left behind by
//! a crash between the two phases are found again by [`FileMetadataStore::get_orphans`].
//!
//! # Concurrency
//!
//! The store holds no locks and caches nothing.  Different chain IDs never interfere; callers
//! creating the same chain ID concurrently must serialize themselves.

pub mod config;
pub mod descriptor;
pub mod digest;
pub mod error;
pub mod id;
pub mod mounts;
pub mod orphan;
pub mod store;
pub mod transaction;
pub mod util;
pub mod writeset;

#[cfg(test)]
pub(crate) mod test;

pub use config::StoreConfig;
pub use descriptor::Descriptor;
pub use digest::{Algorithm, ChainId, DiffId, Digest};
pub use error::{Result, StoreError};
pub use id::is_valid_id;
pub use mounts::MountMetadata;
pub use orphan::{CleanupResult, OrphanLayer};
pub use store::{FileMetadataStore, LayerMetadata, TarSplitReader};
pub use transaction::{TarSplitWriter, Transaction};

/// Suffix appended to a layer directory that is pending deletion.
pub const REMOVING_SUFFIX: &str = "-removing";

pub(crate) const TMP_DIR: &str = "tmp";
pub(crate) const MOUNTS_DIR: &str = "mounts";

pub(crate) const ROOT_DIR_MODE: u32 = 0o700;
pub(crate) const LAYER_DIR_MODE: u32 = 0o755;
pub(crate) const FILE_MODE: u32 = 0o644;
