use std::{
    fs::DirBuilder,
    io::{ErrorKind, Result},
    os::unix::fs::DirBuilderExt,
    path::Path,
};

use rand::Rng;
use rustix::io::{Errno, Result as ErrnoResult};

pub(crate) trait ErrnoFilter<T> {
    fn filter_errno(self, ignored: Errno) -> ErrnoResult<Option<T>>;
}

impl<T> ErrnoFilter<T> for ErrnoResult<T> {
    fn filter_errno(self, ignored: Errno) -> ErrnoResult<Option<T>> {
        match self {
            Ok(result) => Ok(Some(result)),
            Err(err) if err == ignored => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Same as [`ErrnoFilter`], for std I/O results where absence is expected.
pub(crate) trait NotFoundFilter<T> {
    fn filter_not_found(self) -> Result<Option<T>>;
}

impl<T> NotFoundFilter<T> for Result<T> {
    fn filter_not_found(self) -> Result<Option<T>> {
        match self {
            Ok(result) => Ok(Some(result)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Create `path` and any missing parents with the given mode.  Existing directories are left
/// untouched.
pub(crate) fn ensure_dir_all(path: impl AsRef<Path>, mode: u32) -> Result<()> {
    DirBuilder::new().recursive(true).mode(mode).create(path)
}

/// Read a small metadata file and strip surrounding whitespace.
pub(crate) fn read_trimmed(path: impl AsRef<Path>) -> Result<String> {
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}

/// A random 64-character lowercase hex string, the same shape as a mount ID.
pub fn generate_random_id() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

#[cfg(test)]
mod test {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::id::is_valid_id;

    #[test]
    fn test_generate_random_id() {
        let a = generate_random_id();
        let b = generate_random_id();
        assert!(is_valid_id(&a));
        assert!(is_valid_id(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_filter_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = read_trimmed(dir.path().join("missing")).filter_not_found();
        assert_eq!(missing.unwrap(), None);

        std::fs::write(dir.path().join("present"), "  value\n").unwrap();
        let present = read_trimmed(dir.path().join("present")).filter_not_found();
        assert_eq!(present.unwrap().as_deref(), Some("value"));
    }

    #[test]
    fn test_filter_errno() {
        let ok: ErrnoResult<u32> = Ok(1);
        assert_eq!(ok.filter_errno(Errno::EXIST).unwrap(), Some(1));
        let exist: ErrnoResult<u32> = Err(Errno::EXIST);
        assert_eq!(exist.filter_errno(Errno::EXIST).unwrap(), None);
        let other: ErrnoResult<u32> = Err(Errno::ACCESS);
        assert_eq!(other.filter_errno(Errno::EXIST).unwrap_err(), Errno::ACCESS);
    }

    #[test]
    fn test_ensure_dir_all_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_dir_all(&nested, 0o755).unwrap();
        ensure_dir_all(&nested, 0o755).unwrap();
        assert!(nested.is_dir());
    }
}
