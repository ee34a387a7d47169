//! Compression Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An encoder or decoder could not be set up.
    #[display("cannot initialise codec")]
    Encoder,
    /// The compressed input is truncated or not in the expected format.
    #[display("corrupt compressed stream")]
    InvalidData,
    #[display("unknown compression: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// Known, but this build was compiled without it.
    #[display("compression not compiled in: {_0}")]
    DisabledFormat(#[error(not(source))] String),
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::InvalidData, "corrupt compressed stream", false)]
    #[case(ErrorKind::UnsupportedFormat("lz4".to_string()), "unknown compression: lz4", false)]
    #[case(ErrorKind::DisabledFormat("zstd".to_string()), "compression not compiled in: zstd", false)]
    #[case(ErrorKind::Io, "I/O error", true)]
    fn test_error_kind(#[case] kind: ErrorKind, #[case] display: &str, #[case] retryable: bool) {
        assert_eq!(kind.to_string(), display);
        assert_eq!(kind.is_retryable(), retryable);
    }

    #[test]
    fn test_unknown_name_is_unsupported() {
        let err = "lz4".parse::<crate::Compression>().unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat("lz4".to_string()));
    }
}
