//! One update run: lock, diff, accept, finalize, publish, unlock.

use crate::diff::{PackageDiff, diff};
use crate::error::{ErrorKind, Result};
use crate::lock::RepositoryLock;
use crate::scan::{incoming_checksums, published_checksums};
use exn::ResultExt;
use futures::future::join_all;
use futures::{StreamExt, stream};
use repodata_checksum::Algorithm;
use repodata_compress::Compression;
use repodata_metadata::{
    MetadataCoordinator, MetadataKind, Naming, PrecedingMetadata, Publication, Removals, RepositoryIndex,
    UpdateMode, remove_stale,
};
use repodata_rpm::HeaderReader;
use repodata_rpm::error::ErrorKind as RpmErrorKind;
use repodata_storage::BackendHandle;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// Package headers read at the same time.
pub const MAX_READ_CONCURRENCY: usize = 8;

#[derive(Clone, Debug)]
pub struct UpdateOptions {
    pub mode: UpdateMode,
    pub naming: Naming,
    pub compression: Compression,
    pub algorithm: Algorithm,
    /// Only archives under this prefix are part of the repository.
    pub packages_prefix: Option<PathBuf>,
    /// Leave unreadable archives out of the metadata instead of failing.
    pub skip_invalid: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            mode: UpdateMode::default(),
            naming: Naming::default(),
            compression: Compression::Gzip,
            algorithm: Algorithm::default(),
            packages_prefix: None,
            skip_invalid: true,
        }
    }
}

/// What a run changed.
#[derive(Clone, Debug, Default)]
pub struct UpdateReport {
    pub mode: UpdateMode,
    /// Archives whose records were written.
    pub added: Vec<String>,
    /// Archives no longer in storage whose records were pruned.
    pub removed: Vec<String>,
    /// Archives skipped because their header could not be read.
    pub invalid: Vec<String>,
    pub publications: Vec<Publication>,
}

impl UpdateReport {
    /// Packages in the published document of `kind`.
    pub fn count(&self, kind: MetadataKind) -> Option<u64> {
        self.publications.iter().find(|p| p.kind == kind).map(|p| p.count)
    }
}

/// Brings the metadata of one repository in line with its archives.
pub struct Updater {
    backend: BackendHandle,
    reader: Arc<dyn HeaderReader>,
    options: UpdateOptions,
}

impl Updater {
    pub fn new(backend: BackendHandle, reader: Arc<dyn HeaderReader>, options: UpdateOptions) -> Self {
        Self { backend, reader, options }
    }

    /// Run one update under the repository lock.
    ///
    /// The lock is released whether or not the run succeeds.
    #[instrument(skip_all, fields(backend = self.backend.name(), mode = %self.options.mode))]
    pub async fn run(&self) -> Result<UpdateReport> {
        let mut lock = RepositoryLock::new(self.backend.clone());
        lock.lock().await?;
        let result = self.run_locked().await;
        let released = lock.unlock().await;
        if let (Err(_), Err(err)) = (&result, &released) {
            tracing::error!(error = %err, "failed to release repository lock after a failed run");
        }
        let report = result?;
        released?;
        tracing::info!(
            added = report.added.len(),
            removed = report.removed.len(),
            invalid = report.invalid.len(),
            "repository metadata updated"
        );
        Ok(report)
    }

    async fn run_locked(&self) -> Result<UpdateReport> {
        let workdir = tempfile::TempDir::new().or_raise(|| ErrorKind::Io)?;
        let mut index = RepositoryIndex::create_or_load(&self.backend).await.or_raise(|| ErrorKind::Metadata)?;

        let incoming = incoming_checksums(
            &self.backend,
            self.options.packages_prefix.as_deref(),
            self.options.algorithm,
        )
        .await?;
        let preceding = self.preceding(workdir.path()).await?;
        let published = published_checksums(preceding.get(&MetadataKind::Primary).cloned()).await?;
        let changes = diff(&incoming, &published);
        tracing::info!(
            incoming = incoming.len(),
            published = published.len(),
            to_add = changes.to_add.len(),
            to_delete = changes.to_delete.len(),
            replaced = changes.replaced.len(),
            "compared archives with published metadata"
        );

        let mut coordinators = MetadataKind::ALL
            .into_iter()
            .map(|kind| MetadataCoordinator::new(kind, self.options.mode, workdir.path()))
            .collect::<repodata_metadata::error::Result<Vec<_>>>()
            .or_raise(|| ErrorKind::Metadata)?;
        let mut report = UpdateReport {
            mode: self.options.mode,
            removed: changes.to_delete.keys().cloned().collect(),
            ..UpdateReport::default()
        };
        self.accept_changes(&changes, &mut coordinators, &mut report).await?;

        let removals = Arc::new(changes.removals());
        let preceding = &preceding;
        let staged = join_all(coordinators.into_iter().map(|coordinator| {
            let previous = preceding.get(&coordinator.kind()).cloned();
            let removals = Arc::clone(&removals);
            self.publish(coordinator, previous, removals)
        }))
        .await;
        let mut failure = None;
        for result in staged {
            match result {
                Ok(publication) => report.publications.push(publication),
                Err(err) => failure = failure.or(Some(err)),
            }
        }
        if let Some(err) = failure {
            self.discard(&report.publications).await;
            return Err(err);
        }

        // Nothing replaces a published key until every document is staged.
        let published = async {
            for publication in &report.publications {
                publication.register(&mut index)?;
            }
            index.close(&self.backend, &report.publications).await
        };
        if let Err(err) = published.await {
            self.discard(&report.publications).await;
            return Err(err).or_raise(|| ErrorKind::Metadata);
        }

        match remove_stale(&self.backend, &index).await {
            Ok(stale) if !stale.is_empty() => tracing::info!(count = stale.len(), "removed stale metadata"),
            Ok(_) => {},
            Err(err) => tracing::warn!(error = %err, "failed to remove stale metadata"),
        }
        Ok(report)
    }

    /// Decompress the published documents an incremental run builds on.
    async fn preceding(&self, workdir: &Path) -> Result<BTreeMap<MetadataKind, PathBuf>> {
        let mut found = BTreeMap::new();
        if self.options.mode == UpdateMode::Rebuild {
            return Ok(found);
        }
        for kind in MetadataKind::ALL {
            let locator = PrecedingMetadata::new(self.backend.clone(), kind);
            if let Some(path) = locator.find_and_unzip(workdir).await.or_raise(|| ErrorKind::Metadata)? {
                found.insert(kind, path);
            }
        }
        if !found.is_empty() && found.len() < MetadataKind::ALL.len() {
            tracing::warn!(found = found.len(), "published metadata is incomplete; consider a rebuild");
        }
        Ok(found)
    }

    /// Read every new or changed archive and hand its record to each
    /// coordinator, in path order.
    async fn accept_changes(
        &self,
        changes: &PackageDiff,
        coordinators: &mut [MetadataCoordinator],
        report: &mut UpdateReport,
    ) -> Result<()> {
        let mut records = stream::iter(changes.to_add.keys())
            .map(|path| async move { (path, self.reader.read_record(Path::new(path)).await) })
            .buffered(MAX_READ_CONCURRENCY);
        while let Some((path, result)) = records.next().await {
            match result {
                Ok(record) => {
                    for coordinator in coordinators.iter_mut() {
                        coordinator.accept(&record).or_raise(|| ErrorKind::Metadata)?;
                    }
                    report.added.push(path.clone());
                },
                Err(err) if self.options.skip_invalid && matches!(*err, RpmErrorKind::InvalidPackage(_)) => {
                    tracing::warn!(path = %path, error = %err, "skipping unreadable package");
                    report.invalid.push(path.clone());
                },
                Err(err) => return Err(err).or_raise(|| ErrorKind::Package),
            }
        }
        Ok(())
    }

    async fn publish(
        &self,
        coordinator: MetadataCoordinator,
        preceding: Option<PathBuf>,
        removals: Arc<Removals>,
    ) -> Result<Publication> {
        let document = tokio::task::spawn_blocking(move || coordinator.brush(preceding.as_deref(), &removals))
            .await
            .or_raise(|| ErrorKind::Io)?
            .or_raise(|| ErrorKind::Metadata)?;
        document
            .save(&self.backend, self.options.naming, self.options.compression, self.options.algorithm)
            .await
            .or_raise(|| ErrorKind::Metadata)
    }

    async fn discard(&self, publications: &[Publication]) {
        join_all(publications.iter().map(|p| p.discard(&self.backend))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use repodata_checksum::Checksum;
    use repodata_rpm::tags::EmptyTable;
    use repodata_rpm::{Evr, HeaderRange, PackageRecord, SourceFacts};
    use repodata_storage::backend::{BoxSyncRead, BoxSyncWrite, FileInfoStream, MockBackend};
    use repodata_storage::error::{ErrorKind as StorageErrorKind, Result as StorageResult};
    use repodata_storage::{FileInfo, StorageBackend, validate_path};

    /// Builds records straight from the archive bytes: `<name>-<version>`
    /// becomes the package name and version, `bad` marks an unreadable one.
    struct FakeReader(BackendHandle);

    #[async_trait]
    impl HeaderReader for FakeReader {
        async fn read_record(&self, key: &Path) -> repodata_rpm::error::Result<PackageRecord> {
            let bytes = self.0.read(key).await.or_raise(|| RpmErrorKind::Storage)?;
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let Some((name, version)) = text.split_once('-') else {
                exn::bail!(RpmErrorKind::InvalidPackage(key.to_path_buf()));
            };
            let facts = SourceFacts {
                location: key.to_string_lossy().into_owned(),
                checksum: Checksum {
                    algorithm: Algorithm::Sha256,
                    hex: Algorithm::Sha256.digest(&bytes),
                    size: bytes.len() as u64,
                },
                file_time: 1_700_000_000,
            };
            let mut record = PackageRecord::from_tags(&EmptyTable, &EmptyTable, HeaderRange { start: 96, end: 200 }, facts);
            record.name = name.to_string();
            record.arch = "noarch".to_string();
            record.evr = Evr::parse(version);
            Ok(record)
        }
    }

    fn repository(files: &[(&str, &str)]) -> (Arc<MockBackend>, BackendHandle) {
        let mock = Arc::new(MockBackend::with_files(files.iter().map(|(k, v)| (*k, v.as_bytes().to_vec()))));
        let backend: BackendHandle = mock.clone();
        (mock, backend)
    }

    async fn run(backend: &BackendHandle, options: UpdateOptions) -> Result<UpdateReport> {
        Updater::new(backend.clone(), Arc::new(FakeReader(backend.clone())), options).run().await
    }

    async fn published_xml(backend: &BackendHandle, kind: MetadataKind) -> String {
        let index = RepositoryIndex::create_or_load(backend).await.unwrap();
        let location = index.location(kind).unwrap().to_string();
        let packed = backend.read(&validate_path(&location).unwrap()).await.unwrap();
        String::from_utf8(Compression::from_path(&location).decompress(&packed).unwrap()).unwrap()
    }

    fn metadata_keys(mock: &MockBackend) -> Vec<String> {
        mock.keys()
            .into_iter()
            .filter(|k| k.starts_with("repodata"))
            .map(|k| k.to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_empty_rebuild() {
        let (mock, backend) = repository(&[]);
        let options = UpdateOptions { mode: UpdateMode::Rebuild, ..UpdateOptions::default() };
        let report = run(&backend, options).await.unwrap();
        assert!(report.added.is_empty());
        assert_eq!(report.publications.len(), 3);

        let index = RepositoryIndex::create_or_load(&backend).await.unwrap();
        assert_eq!(index.entries().len(), 3);
        for entry in index.entries() {
            let packed = backend.read(&validate_path(&entry.location).unwrap()).await.unwrap();
            assert_eq!(entry.checksum.hex, Algorithm::Sha256.digest(&packed));
            assert_eq!(entry.size, packed.len() as u64);
        }
        for kind in MetadataKind::ALL {
            assert!(published_xml(&backend, kind).await.contains("packages=\"0\""));
        }
        // Three documents and the index; no lock marker or temp file left.
        assert_eq!(metadata_keys(&mock).len(), 4);
        assert_eq!(mock.keys().len(), 4);
    }

    #[tokio::test]
    async fn test_incremental_add_and_remove() {
        let (mock, backend) = repository(&[("Packages/a.rpm", "alpha-1.0-1"), ("Packages/b.rpm", "beta-2.0-1")]);
        let report = run(&backend, UpdateOptions::default()).await.unwrap();
        assert_eq!(report.added, vec!["Packages/a.rpm", "Packages/b.rpm"]);
        assert_eq!(report.count(MetadataKind::Primary), Some(2));

        backend.delete(Path::new("Packages/a.rpm")).await.unwrap();
        backend.write(Path::new("Packages/c.rpm"), b"gamma-3.0-1").await.unwrap();
        let report = run(&backend, UpdateOptions::default()).await.unwrap();
        assert_eq!(report.added, vec!["Packages/c.rpm"]);
        assert_eq!(report.removed, vec!["Packages/a.rpm"]);
        for kind in MetadataKind::ALL {
            assert_eq!(report.count(kind), Some(2));
        }

        let primary = published_xml(&backend, MetadataKind::Primary).await;
        assert!(primary.contains("packages=\"2\""));
        assert!(primary.contains("<name>beta</name>"));
        assert!(primary.contains("<name>gamma</name>"));
        assert!(!primary.contains("<name>alpha</name>"));
        // The first run's documents were cleaned up.
        assert_eq!(metadata_keys(&mock).len(), 4);
    }

    #[tokio::test]
    async fn test_unchanged_repository_republishes_same_documents() {
        let (_, backend) = repository(&[("Packages/a.rpm", "alpha-1.0-1")]);
        let first = run(&backend, UpdateOptions::default()).await.unwrap();
        let second = run(&backend, UpdateOptions::default()).await.unwrap();
        assert!(second.added.is_empty());
        assert!(second.removed.is_empty());
        for (before, after) in first.publications.iter().zip(&second.publications) {
            assert_eq!(before.kind, after.kind);
            assert_eq!(before.open_checksum, after.open_checksum);
            assert_eq!(before.key, after.key);
        }
    }

    #[tokio::test]
    async fn test_changed_archive_replaces_record() {
        let (_, backend) = repository(&[("Packages/a.rpm", "alpha-1.0-1")]);
        run(&backend, UpdateOptions::default()).await.unwrap();
        backend.write(Path::new("Packages/a.rpm"), b"alpha-1.1-1").await.unwrap();
        let report = run(&backend, UpdateOptions::default()).await.unwrap();
        assert_eq!(report.added, vec!["Packages/a.rpm"]);
        assert_eq!(report.count(MetadataKind::Primary), Some(1));
        let primary = published_xml(&backend, MetadataKind::Primary).await;
        assert!(primary.contains("ver=\"1.1\""));
        assert!(!primary.contains("ver=\"1.0\""));
    }

    #[tokio::test]
    async fn test_rebuild_ignores_published_metadata() {
        let (_, backend) = repository(&[("Packages/a.rpm", "alpha-1.0-1"), ("Packages/b.rpm", "beta-1.0-1")]);
        run(&backend, UpdateOptions::default()).await.unwrap();
        let options = UpdateOptions { mode: UpdateMode::Rebuild, ..UpdateOptions::default() };
        let report = run(&backend, options).await.unwrap();
        assert_eq!(report.added.len(), 2);
        assert_eq!(report.count(MetadataKind::Other), Some(2));
    }

    #[tokio::test]
    async fn test_invalid_package_policy() {
        let (mock, backend) = repository(&[("Packages/a.rpm", "alpha-1.0-1"), ("Packages/broken.rpm", "garbage")]);
        let strict = UpdateOptions { skip_invalid: false, ..UpdateOptions::default() };
        let err = run(&backend, strict).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Package);
        // Nothing published, and the lock is gone.
        assert!(metadata_keys(&mock).is_empty());
        assert_eq!(mock.keys().len(), 2);

        let report = run(&backend, UpdateOptions::default()).await.unwrap();
        assert_eq!(report.invalid, vec!["Packages/broken.rpm"]);
        assert_eq!(report.count(MetadataKind::Primary), Some(1));
    }

    #[tokio::test]
    async fn test_locked_repository() {
        let (mock, backend) = repository(&[("Packages/a.rpm", "alpha-1.0-1")]);
        let mut holder = RepositoryLock::new(backend.clone());
        holder.lock().await.unwrap();
        let err = run(&backend, UpdateOptions::default()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::RepositoryLocked);
        assert!(metadata_keys(&mock).is_empty());
        holder.unlock().await.unwrap();
    }

    #[tokio::test]
    async fn test_plain_naming() {
        let (mock, backend) = repository(&[("Packages/a.rpm", "alpha-1.0-1")]);
        let options = UpdateOptions { naming: Naming::Plain, compression: Compression::Bzip2, ..UpdateOptions::default() };
        run(&backend, options).await.unwrap();
        assert_eq!(
            metadata_keys(&mock),
            vec!["repodata/filelists.xml.bz2", "repodata/other.xml.bz2", "repodata/primary.xml.bz2", "repodata/repomd.xml"]
        );
    }

    /// Refuses every upload of the repository index.
    struct RejectIndex(Arc<MockBackend>);

    impl RejectIndex {
        fn check(path: &Path) -> StorageResult<()> {
            if path.file_name().is_some_and(|name| name.to_string_lossy().contains("repomd")) {
                exn::bail!(StorageErrorKind::PermissionDenied(path.to_path_buf()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl StorageBackend for RejectIndex {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
            self.0.list_stream(prefix)
        }
        async fn exists(&self, path: &Path) -> StorageResult<bool> {
            self.0.exists(path).await
        }
        async fn read(&self, path: &Path) -> StorageResult<Vec<u8>> {
            self.0.read(path).await
        }
        async fn reader(&self, path: &Path) -> StorageResult<BoxSyncRead> {
            self.0.reader(path).await
        }
        async fn write(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
            Self::check(path)?;
            self.0.write(path, data).await
        }
        async fn writer(&self, path: &Path) -> StorageResult<BoxSyncWrite> {
            Self::check(path)?;
            self.0.writer(path).await
        }
        async fn delete(&self, path: &Path) -> StorageResult<()> {
            self.0.delete(path).await
        }
        async fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
            self.0.rename(from, to).await
        }
        async fn stat(&self, path: &Path) -> StorageResult<FileInfo> {
            self.0.stat(path).await
        }
    }

    #[tokio::test]
    async fn test_failed_index_write_leaves_published_documents() {
        let (mock, backend) = repository(&[("Packages/a.rpm", "alpha-1.0-1")]);
        let options = UpdateOptions { naming: Naming::Plain, ..UpdateOptions::default() };
        run(&backend, options.clone()).await.unwrap();
        let published = metadata_keys(&mock);
        let primary = Path::new("repodata/primary.xml.gz");
        let before = backend.read(primary).await.unwrap();

        backend.write(Path::new("Packages/b.rpm"), b"beta-1.0-1").await.unwrap();
        let rejecting: BackendHandle = Arc::new(RejectIndex(mock.clone()));
        let err = run(&rejecting, options).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Metadata);

        // The published documents still match the index that describes them.
        assert_eq!(backend.read(primary).await.unwrap(), before);
        let index = RepositoryIndex::create_or_load(&backend).await.unwrap();
        for entry in index.entries() {
            let packed = backend.read(&validate_path(&entry.location).unwrap()).await.unwrap();
            assert_eq!(entry.checksum.hex, Algorithm::Sha256.digest(&packed));
        }
        // No staged upload or lock marker survives the failure.
        assert_eq!(metadata_keys(&mock), published);
        assert_eq!(mock.keys().len(), published.len() + 2);
    }

    #[tokio::test]
    async fn test_identical_archives_at_two_paths() {
        let (mock, backend) = repository(&[("Packages/a.rpm", "alpha-1.0-1")]);
        run(&backend, UpdateOptions::default()).await.unwrap();
        backend.write(Path::new("Copies/a.rpm"), b"alpha-1.0-1").await.unwrap();

        let report = run(&backend, UpdateOptions::default()).await.unwrap();
        assert_eq!(report.added, vec!["Copies/a.rpm"]);
        for _ in 0..2 {
            let report = run(&backend, UpdateOptions::default()).await.unwrap();
            assert!(report.added.is_empty());
            assert!(report.removed.is_empty());
            for kind in MetadataKind::ALL {
                assert_eq!(report.count(kind), Some(2));
            }
        }
        let primary = published_xml(&backend, MetadataKind::Primary).await;
        assert!(primary.contains("href=\"Copies/a.rpm\""));
        assert!(primary.contains("href=\"Packages/a.rpm\""));

        let rebuild = UpdateOptions { mode: UpdateMode::Rebuild, ..UpdateOptions::default() };
        let report = run(&backend, rebuild).await.unwrap();
        assert_eq!(report.count(MetadataKind::Primary), Some(2));

        backend.delete(Path::new("Copies/a.rpm")).await.unwrap();
        let report = run(&backend, UpdateOptions::default()).await.unwrap();
        assert_eq!(report.removed, vec!["Copies/a.rpm"]);
        for kind in MetadataKind::ALL {
            assert_eq!(report.count(kind), Some(1));
        }
        let primary = published_xml(&backend, MetadataKind::Primary).await;
        assert!(primary.contains("href=\"Packages/a.rpm\""));
        assert!(!primary.contains("Copies/a.rpm"));
        assert_eq!(metadata_keys(&mock).len(), 4);
    }
}
