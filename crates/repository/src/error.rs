//! Repository Error Types

use derive_more::{Display, Error};

/// A repository error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for repository operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Another run holds the repository lock. Retry later.
    #[display("repository is locked by another run")]
    RepositoryLocked,
    /// A package archive could not be read.
    #[display("package could not be read")]
    Package,
    #[display("metadata error")]
    Metadata,
    #[display("checksum error")]
    Checksum,
    #[display("storage error")]
    Storage,
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RepositoryLocked | Self::Storage | Self::Io)
    }
}
