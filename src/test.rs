use tempfile::TempDir;

use crate::{
    digest::{Algorithm, Digest},
    store::FileMetadataStore,
};

pub fn tempdir() -> TempDir {
    TempDir::with_prefix("layerdb-test-").unwrap()
}

/// A well-formed sha256 digest made of one repeated byte, e.g. `sha256:abab...`.
pub fn digest(byte: u8) -> Digest {
    Digest::from_encoded(Algorithm::Sha256, format!("{byte:02x}").repeat(32)).unwrap()
}

/// A fresh store rooted in its own temporary directory.
pub fn store() -> (TempDir, FileMetadataStore) {
    let tmp = tempdir();
    let store = FileMetadataStore::new(tmp.path().join("layerdb")).unwrap();
    (tmp, store)
}
