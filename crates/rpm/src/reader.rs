use crate::error::{ErrorKind, Result};
use crate::header;
use crate::record::{PackageRecord, SourceFacts};
use async_trait::async_trait;
use exn::ResultExt;
use repodata_checksum::{Algorithm, HashingReader};
use repodata_storage::BackendHandle;
use std::io;
use std::path::Path;
use tracing::instrument;

/// Turns an archive in storage into a [`PackageRecord`].
///
/// Failures for a single archive are reported as
/// [`InvalidPackage`](ErrorKind::InvalidPackage) (malformed contents) or
/// [`Storage`](ErrorKind::Storage); whether that aborts the run is the
/// caller's call.
#[async_trait]
pub trait HeaderReader: Send + Sync {
    async fn read_record(&self, key: &Path) -> Result<PackageRecord>;
}

/// Reads archives from a storage backend, digesting each one completely.
pub struct StorageHeaderReader {
    backend: BackendHandle,
    algorithm: Algorithm,
}

impl StorageHeaderReader {
    pub fn new(backend: BackendHandle, algorithm: Algorithm) -> Self {
        Self { backend, algorithm }
    }

    async fn read_inner(&self, key: &Path) -> Result<PackageRecord> {
        let info = self.backend.stat(key).await.or_raise(|| ErrorKind::Storage)?;
        let reader = self.backend.reader(key).await.or_raise(|| ErrorKind::Storage)?;
        let algorithm = self.algorithm;
        let (headers, checksum) = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut reader = HashingReader::new(reader, algorithm);
            let headers = header::read_package(&mut reader)?;
            // The pkgid covers the payload too.
            io::copy(&mut reader, &mut io::sink()).or_raise(|| ErrorKind::Io)?;
            Ok((headers, reader.finish().1))
        })
        .await
        .or_raise(|| ErrorKind::Io)??;

        let facts = SourceFacts {
            location: key.to_string_lossy().into_owned(),
            checksum,
            file_time: u64::try_from(info.modified.unix_timestamp()).unwrap_or(0),
        };
        Ok(PackageRecord::from_tags(&headers.main, &headers.signature, headers.range, facts))
    }
}

#[async_trait]
impl HeaderReader for StorageHeaderReader {
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    async fn read_record(&self, key: &Path) -> Result<PackageRecord> {
        match self.read_inner(key).await {
            Ok(record) => {
                tracing::debug!(name = %record.name, evr = %record.evr, pkgid = %record.pkgid(), "read package header");
                Ok(record)
            },
            Err(err) if matches!(*err, ErrorKind::Malformed(_) | ErrorKind::Io) => {
                Err(err).or_raise(|| ErrorKind::InvalidPackage(key.to_path_buf()))
            },
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::testing::{HeaderBuilder, archive};
    use crate::tags::Tag;
    use repodata_storage::backend::MockBackend;
    use std::sync::Arc;

    fn hello_archive() -> Vec<u8> {
        let signature = HeaderBuilder::default().int32s(Tag::PayloadSize, &[42]);
        let main = HeaderBuilder::default()
            .string(Tag::Name, "hello")
            .string(Tag::Version, "1.0")
            .string(Tag::Release, "1")
            .string(Tag::Arch, "x86_64")
            .string(Tag::SourceRpm, "hello-1.0-1.src.rpm")
            .i18n(Tag::Summary, "Hello")
            .strings(Tag::DirNames, &["/usr/bin/"])
            .strings(Tag::BaseNames, &["hello"])
            .int32s(Tag::DirIndexes, &[0]);
        archive(&signature, &main, b"compressed payload bytes")
    }

    #[tokio::test]
    async fn test_read_record() {
        let bytes = hello_archive();
        let backend = Arc::new(MockBackend::with_files([("Packages/hello-1.0-1.x86_64.rpm", bytes.clone())]));
        let reader = StorageHeaderReader::new(backend, Algorithm::Sha256);

        let record = reader.read_record(Path::new("Packages/hello-1.0-1.x86_64.rpm")).await.unwrap();
        assert_eq!(record.name, "hello");
        assert_eq!(record.arch, "x86_64");
        assert_eq!(record.summary, "Hello");
        assert_eq!(record.archive_size, 42);
        assert_eq!(record.location, "Packages/hello-1.0-1.x86_64.rpm");
        assert_eq!(record.pkgid(), Algorithm::Sha256.digest(&bytes));
        assert_eq!(record.size(), bytes.len() as u64);
        assert!(record.header_range.start >= 96);
        assert!(record.header_range.end < bytes.len() as u64);
        assert_eq!(record.files().next().map(|f| f.path), Some("/usr/bin/hello".to_string()));
    }

    #[tokio::test]
    async fn test_garbage_is_invalid_package() {
        let backend = Arc::new(MockBackend::with_files([("Packages/broken.rpm", b"definitely not an rpm".to_vec())]));
        let reader = StorageHeaderReader::new(backend, Algorithm::Sha256);
        let err = reader.read_record(Path::new("Packages/broken.rpm")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidPackage("Packages/broken.rpm".into()));
    }

    #[tokio::test]
    async fn test_missing_is_storage_error() {
        let reader = StorageHeaderReader::new(Arc::new(MockBackend::default()), Algorithm::Sha256);
        let err = reader.read_record(Path::new("Packages/missing.rpm")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Storage);
    }
}
