//! Metadata Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A metadata error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Every kind aborts the current run; nothing here is retried internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A document could not be streamed: malformed input XML or a failed
    /// write. Partial temp files are discarded.
    #[display("metadata document stream failed")]
    XmlStream,
    /// `accept` was called on a writer that has already been closed.
    #[display("metadata writer is already closed")]
    ClosedWriter,
    /// An index entry was closed before every required field was set.
    #[display("repository index entry is missing its {_0}")]
    IncompleteIndexEntry(#[error(not(source))] &'static str),
    /// More than one published file claims to be the document of this type,
    /// and `repomd.xml` does not say which one is current.
    #[display("ambiguous {kind} metadata: {}", candidates.join(", "))]
    AmbiguousMetadata { kind: String, candidates: Vec<String> },
    #[display("unsupported naming policy: {_0}")]
    UnsupportedNaming(#[error(not(source))] String),
    #[display("unsupported update mode: {_0}")]
    UnsupportedMode(#[error(not(source))] String),
    #[display("compression error")]
    Compression,
    #[display("storage error")]
    Storage,
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Io)
    }
}
