//! Checksum Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A checksum error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for checksum operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configured algorithm name is not one of [`Algorithm`](crate::Algorithm).
    /// A configuration error; fix the configuration rather than retrying.
    #[display("unsupported digest: {_0}")]
    UnsupportedDigest(#[error(not(source))] String),
    /// The stream being digested could not be read to the end.
    #[display("I/O error while digesting")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}
