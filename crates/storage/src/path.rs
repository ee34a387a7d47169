//! Key validation.
//!
//! Archive keys arrive from uploads and from `location href` attributes in
//! previously published metadata, so neither can be trusted to stay inside
//! the repository root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage key, resolving `.` and `..` components and rejecting
/// anything that would leave the repository root.
///
/// > **Note:** This does **not** normalize backslashes or non-UTF8 bytes.
/// >           Null bytes are explicitly rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use repodata_storage::validate_path;
/// assert!(validate_path("Packages/a-1.0-1.noarch.rpm").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert_eq!(
///     validate_path("./repodata//../repodata/repomd.xml").unwrap(),
///     Path::new("repodata/repomd.xml")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert_eq!(validate("repodata/repomd.xml").unwrap(), Path::new("repodata/repomd.xml"));
        assert_eq!(validate("a-1.0-1.x86_64.rpm").unwrap(), Path::new("a-1.0-1.x86_64.rpm"));
    }

    #[test]
    fn test_normalization() {
        assert_eq!(validate("repodata//primary.xml.gz").unwrap(), Path::new("repodata/primary.xml.gz"));
        assert_eq!(validate("./Packages/./a.rpm").unwrap(), Path::new("Packages/a.rpm"));
        assert_eq!(validate("/Packages/a.rpm").unwrap(), Path::new("Packages/a.rpm"));
        assert_eq!(validate("repodata/").unwrap(), Path::new("repodata"));
        // Traversal that stays inside the root resolves.
        assert_eq!(validate("Packages/../repodata").unwrap(), Path::new("repodata"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate("../etc/passwd").is_err());
        assert!(validate("Packages/../../b.rpm").is_err());
        assert!(validate("..").is_err());
    }

    #[test]
    fn test_invalid_keys() {
        assert!(validate("a\0b.rpm").is_err());
        assert!(validate("").is_err());
        assert!(validate(".").is_err());
        assert!(validate("//").is_err());
    }
}
