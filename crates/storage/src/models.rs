//! Storage models.

use repodata_compress::Compression;
use std::path::PathBuf;
use time::OffsetDateTime;

/// Key metadata returned by storage backends when listing or stat-ing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Key relative to the repository root
    pub path: PathBuf,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
    /// Compression detected from the key's extension
    pub compression: Compression,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: impl Into<OffsetDateTime>) -> Self {
        let path = path.into();
        let compression = Compression::from_path(&path);
        Self {
            path,
            size,
            modified: modified.into(),
            compression,
        }
    }

    /// Final component of the key, if it is valid UTF-8.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_detected_from_key() {
        let info = FileInfo::new("repodata/primary.xml.gz", 10, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(info.compression, Compression::Gzip);
        assert_eq!(info.file_name(), Some("primary.xml.gz"));
        let info = FileInfo::new("repodata/repomd.xml", 10, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(info.compression, Compression::None);
    }
}
