//! RPM Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An RPM reading error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for RPM operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The archive at this key could not be turned into a package record.
    /// Fatal for that package only; the caller decides whether to skip it.
    #[display("invalid package: {}", _0.display())]
    InvalidPackage(#[error(not(source))] PathBuf),
    /// The byte layout is not a valid RPM lead or header structure.
    #[display("malformed RPM structure: {_0}")]
    Malformed(#[error(not(source))] &'static str),
    /// Reading the archive failed part way through.
    #[display("I/O error")]
    Io,
    /// The storage backend failed to open or stat the archive.
    #[display("storage error")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io | Self::Storage)
    }
}
