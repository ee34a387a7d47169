use crate::error::{ErrorKind, Result};
use crate::repomd::RepositoryIndex;
use crate::{MetadataKind, REPODATA_DIR, REPOMD_KEY, is_temp_name};
use exn::ResultExt;
use repodata_compress::Compression;
use repodata_storage::BackendHandle;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// The currently published document of one type, if any.
pub struct PrecedingMetadata {
    backend: BackendHandle,
    kind: MetadataKind,
}

impl PrecedingMetadata {
    pub fn new(backend: BackendHandle, kind: MetadataKind) -> Self {
        Self { backend, kind }
    }

    /// Keys directly under `repodata/` named like a compressed document of
    /// this type, either `primary.xml.gz` or `<anything>-primary.xml.gz`.
    pub async fn candidates(&self) -> Result<Vec<PathBuf>> {
        let files = self.backend.list(Some(Path::new(REPODATA_DIR))).await.or_raise(|| ErrorKind::Storage)?;
        let mut keys: Vec<_> = files
            .into_iter()
            .filter(|file| file.path.parent() == Some(Path::new(REPODATA_DIR)))
            .filter(|file| file.file_name().is_some_and(|name| matches_kind(self.kind, name)))
            .map(|file| file.path)
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Pick the published key, resolving several candidates through the
    /// current `repomd.xml`.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub async fn locate(&self) -> Result<Option<PathBuf>> {
        let mut candidates = self.candidates().await?;
        if candidates.len() <= 1 {
            return Ok(candidates.pop());
        }
        let index = RepositoryIndex::create_or_load(&self.backend).await?;
        if let Some(location) = index.location(self.kind)
            && let Some(found) = candidates.iter().find(|key| key.as_path() == Path::new(location))
        {
            tracing::warn!(count = candidates.len(), chosen = %found.display(), "several published candidates, using the indexed one");
            return Ok(Some(found.clone()));
        }
        exn::bail!(ErrorKind::AmbiguousMetadata {
            kind: self.kind.to_string(),
            candidates: candidates.iter().map(|key| key.display().to_string()).collect(),
        })
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.locate().await?.is_some())
    }

    /// Decompress the published document into `workdir`.
    ///
    /// `None` means nothing has been published yet.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub async fn find_and_unzip(&self, workdir: &Path) -> Result<Option<PathBuf>> {
        let Some(key) = self.locate().await? else {
            tracing::debug!("no preceding document");
            return Ok(None);
        };
        let reader = self.backend.reader(&key).await.or_raise(|| ErrorKind::Storage)?;
        let compression = Compression::from_path(&key);
        let target = workdir.join(format!("{}.preceding.xml", self.kind));
        let output = target.clone();
        let size = tokio::task::spawn_blocking(move || -> Result<u64> {
            let mut writer = BufWriter::new(File::create(&output).or_raise(|| ErrorKind::Io)?);
            let size = compression.decompress_stream(reader, &mut writer).or_raise(|| ErrorKind::Compression)?;
            writer.flush().or_raise(|| ErrorKind::Io)?;
            Ok(size)
        })
        .await
        .or_raise(|| ErrorKind::Io)??;
        tracing::debug!(key = %key.display(), size, "unpacked preceding document");
        Ok(Some(target))
    }
}

fn matches_kind(kind: MetadataKind, name: &str) -> bool {
    if is_temp_name(name) {
        return false;
    }
    let compression = Compression::from_path(name);
    if compression == Compression::None {
        return false;
    }
    let Some(stem) = name.strip_suffix(compression.extension()) else {
        return false;
    };
    let expected = kind.file_name();
    stem == expected || stem.strip_suffix(expected.as_str()).is_some_and(|prefix| prefix.ends_with('-'))
}

/// Delete metadata files the index no longer references, plus upload
/// leftovers from interrupted runs.
///
/// Only run after the new `repomd.xml` has been committed.
#[instrument(skip_all, fields(backend = backend.name()))]
pub async fn remove_stale(backend: &BackendHandle, index: &RepositoryIndex) -> Result<Vec<PathBuf>> {
    let referenced: Vec<&Path> = index.entries().iter().map(|entry| Path::new(entry.location.as_str())).collect();
    let files = backend.list(Some(Path::new(REPODATA_DIR))).await.or_raise(|| ErrorKind::Storage)?;
    let mut removed = Vec::new();
    for file in files {
        if file.path == Path::new(REPOMD_KEY) || referenced.contains(&file.path.as_path()) {
            continue;
        }
        let Some(name) = file.file_name() else {
            continue;
        };
        let stale = is_temp_name(name) || MetadataKind::ALL.iter().any(|kind| matches_kind(*kind, name));
        if stale {
            backend.delete(&file.path).await.or_raise(|| ErrorKind::Storage)?;
            tracing::info!(key = %file.path.display(), "removed stale metadata file");
            removed.push(file.path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repomd::RepositoryIndex;
    use repodata_checksum::{Algorithm, Checksum};
    use repodata_storage::backend::MockBackend;
    use rstest::rstest;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[rstest]
    #[case(MetadataKind::Primary, "primary.xml.gz", true)]
    #[case(MetadataKind::Primary, "0a1b2c-primary.xml.gz", true)]
    #[case(MetadataKind::Primary, "0a1b2c-primary.xml.bz2", true)]
    #[case(MetadataKind::Primary, "primary.xml", false)]
    #[case(MetadataKind::Primary, "0a1b2c-primary.sqlite.bz2", false)]
    #[case(MetadataKind::Primary, "notprimary.xml.gz", false)]
    #[case(MetadataKind::Other, "0a1b2c-other.xml.gz", true)]
    #[case(MetadataKind::Other, "0a1b2c-primary.xml.gz", false)]
    #[case(MetadataKind::Other, ".1234-other.xml.gz.tmp", false)]
    fn test_matches_kind(#[case] kind: MetadataKind, #[case] name: &str, #[case] expected: bool) {
        assert_eq!(matches_kind(kind, name), expected);
    }

    fn backend(files: &[(&str, Vec<u8>)]) -> BackendHandle {
        Arc::new(MockBackend::with_files(files.iter().cloned()))
    }

    #[tokio::test]
    async fn test_absent() {
        let locator = PrecedingMetadata::new(backend(&[]), MetadataKind::Primary);
        assert!(!locator.exists().await.unwrap());
        let dir = TempDir::new().unwrap();
        assert_eq!(locator.find_and_unzip(dir.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_and_unzip() {
        let xml = b"<metadata packages=\"0\"/>\n".to_vec();
        let packed = Compression::Gzip.compress(&xml).unwrap();
        let locator = PrecedingMetadata::new(
            backend(&[("repodata/abc-primary.xml.gz", packed), ("repodata/abc-other.xml.gz", Vec::new())]),
            MetadataKind::Primary,
        );
        let dir = TempDir::new().unwrap();
        let path = locator.find_and_unzip(dir.path()).await.unwrap().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), xml);
    }

    fn index_pointing_at(location: &str) -> Vec<u8> {
        let mut index = RepositoryIndex::default();
        let checksum = Checksum { algorithm: Algorithm::Sha256, hex: "abc".to_string(), size: 1 };
        let mut entry = index.begin_entry(MetadataKind::Primary);
        entry
            .set_gzip_checksum(&checksum)
            .set_open_checksum(&checksum)
            .set_location(Path::new(location))
            .set_gzip_size(1)
            .set_open_size(1);
        entry.close().unwrap();
        index.to_xml().unwrap()
    }

    #[tokio::test]
    async fn test_ambiguity_resolved_by_index() {
        let locator = PrecedingMetadata::new(
            backend(&[
                ("repodata/aaa-primary.xml.gz", Vec::new()),
                ("repodata/bbb-primary.xml.gz", Vec::new()),
                (REPOMD_KEY, index_pointing_at("repodata/bbb-primary.xml.gz")),
            ]),
            MetadataKind::Primary,
        );
        assert_eq!(locator.locate().await.unwrap(), Some(PathBuf::from("repodata/bbb-primary.xml.gz")));
    }

    #[tokio::test]
    async fn test_ambiguity_without_index_fails() {
        let locator = PrecedingMetadata::new(
            backend(&[("repodata/aaa-primary.xml.gz", Vec::new()), ("repodata/bbb-primary.xml.gz", Vec::new())]),
            MetadataKind::Primary,
        );
        let err = locator.locate().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AmbiguousMetadata { candidates, .. } if candidates.len() == 2));
    }

    #[tokio::test]
    async fn test_remove_stale() {
        let mock = Arc::new(MockBackend::with_files([
            ("repodata/new-primary.xml.gz", Vec::new()),
            ("repodata/old-primary.xml.gz", Vec::new()),
            ("repodata/.0000-other.xml.gz.tmp", Vec::new()),
            ("repodata/comps.xml", Vec::new()),
            ("Packages/a.rpm", Vec::new()),
            (REPOMD_KEY, index_pointing_at("repodata/new-primary.xml.gz")),
        ]));
        let backend: BackendHandle = mock.clone();
        let index = RepositoryIndex::create_or_load(&backend).await.unwrap();
        let mut removed = remove_stale(&backend, &index).await.unwrap();
        removed.sort();
        assert_eq!(
            removed,
            vec![PathBuf::from("repodata/.0000-other.xml.gz.tmp"), PathBuf::from("repodata/old-primary.xml.gz")]
        );
        assert_eq!(mock.keys().len(), 4);
    }
}
