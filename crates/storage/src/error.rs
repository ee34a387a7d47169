//! Storage Error Types

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The key is absent. Expected when probing for optional documents.
    #[display("no such key: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("access denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Empty, escapes the repository root, or contains a null byte.
    #[display("invalid key: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(!ErrorKind::NotFound(PathBuf::from("repodata/repomd.xml")).is_retryable());
        assert!(!ErrorKind::InvalidPath(PathBuf::from("../x")).is_retryable());
        assert!(ErrorKind::from(IoError::other("disk on fire")).is_retryable());
    }

    #[test]
    fn test_display_names_the_key() {
        let kind = ErrorKind::NotFound(PathBuf::from("lock-1"));
        assert_eq!(kind.to_string(), "no such key: lock-1");
    }
}
