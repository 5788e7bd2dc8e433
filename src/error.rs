//! Error types for the layer metadata store.
//!
//! All fallible operations return a [`Result<T>`], an alias for `Result<T, StoreError>`.
//!
//! # Error Categories
//!
//! - **Missing but mandatory**: [`NotFound`] (size, diff ID, cache ID, tar-split, mount ID)
//! - **Malformed**: [`InvalidDigest`], [`InvalidCacheId`], [`InvalidMountId`],
//!   [`InvalidInitId`], [`InvalidMountName`], [`InvalidSize`]
//! - **System errors**: [`Io`], [`Json`], [`Config`]
//!
//! Missing optional fields (parent, init ID, descriptor) are not errors at all; the getters
//! return an empty value instead.
//!
//! [`NotFound`]: StoreError::NotFound
//! [`InvalidDigest`]: StoreError::InvalidDigest
//! [`InvalidCacheId`]: StoreError::InvalidCacheId
//! [`InvalidMountId`]: StoreError::InvalidMountId
//! [`InvalidInitId`]: StoreError::InvalidInitId
//! [`InvalidMountName`]: StoreError::InvalidMountName
//! [`InvalidSize`]: StoreError::InvalidSize
//! [`Io`]: StoreError::Io
//! [`Json`]: StoreError::Json
//! [`Config`]: StoreError::Config

use std::io::ErrorKind;

use crate::digest::ChainId;

/// Result type alias for operations that may return a StoreError.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error types for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A mandatory record is absent.  `what` names the record, `key` the layer or mount.
    #[error("{what} not found for {key}")]
    NotFound { what: &'static str, key: String },

    /// A digest failed to parse or validate.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// The cache-id file exists but is empty after trimming whitespace.
    #[error("invalid cache id value for {0}")]
    InvalidCacheId(ChainId),

    /// The stored mount ID does not have the expected format.
    #[error("invalid mount id value for mount {0}")]
    InvalidMountId(String),

    /// The stored init ID does not have the expected format.
    #[error("invalid init id value for mount {0}")]
    InvalidInitId(String),

    /// A mount name that cannot be used as a single path component.
    #[error("invalid mount name {0:?}")]
    InvalidMountName(String),

    /// The size file does not hold a decimal integer.
    #[error("invalid size value: {0}")]
    InvalidSize(String),

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A descriptor could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl StoreError {
    /// True if this error reports a missing record, as opposed to a malformed one or an I/O
    /// failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound { .. } => true,
            StoreError::Io(err) => err.kind() == ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<rustix::io::Errno> for StoreError {
    fn from(errno: rustix::io::Errno) -> Self {
        StoreError::Io(errno.into())
    }
}
