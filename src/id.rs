//! Format checks for mount and init identifiers.

/// Suffix carried by the init layer belonging to a mount.
pub const INIT_SUFFIX: &str = "-init";

/// Check whether `id` is a well-formed mount or init ID: exactly 64 characters of `[0-9a-f]`,
/// optionally followed by `-init`.
///
/// Identifiers read back from disk are checked with this before they are trusted, so a corrupted
/// file is reported instead of being passed along to the storage driver.
pub fn is_valid_id(id: &str) -> bool {
    let id = id.strip_suffix(INIT_SUFFIX).unwrap_or(id);
    id.len() == 64 && id.bytes().all(|c| matches!(c, b'0'..=b'9' | b'a'..=b'f'))
}
