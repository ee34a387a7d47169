use crate::document::{DocumentReader, count_packages, set_count, write_counted};
use crate::error::{ErrorKind, Result};
use crate::maid::{self, PackageFilter, Removals};
use crate::merge::merge;
use crate::repomd::RepositoryIndex;
use crate::writer::MetadataWriter;
use crate::{MetadataKind, Naming, discard, temp_key};
use exn::ResultExt;
use repodata_checksum::{Algorithm, Checksum, HashingReader, HashingWriter};
use repodata_compress::Compression;
use repodata_rpm::PackageRecord;
use repodata_storage::BackendHandle;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::instrument;

/// How a run treats what is already published.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateMode {
    /// Only new or changed packages are accepted; everything else is carried
    /// over from the preceding documents.
    #[default]
    Incremental,
    /// Every package is accepted and the preceding documents are ignored.
    Rebuild,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::Incremental => "incremental",
            UpdateMode::Rebuild => "rebuild",
        }
    }
}

impl Display for UpdateMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateMode {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "incremental" | "update" => Ok(UpdateMode::Incremental),
            "rebuild" | "full" => Ok(UpdateMode::Rebuild),
            _ => exn::bail!(ErrorKind::UnsupportedMode(s.to_string())),
        }
    }
}

/// Drives one document type through a run and owns its package count.
///
/// The writer only reports that a record was appended; this is the single
/// place where accepted, merged and pruned counts are reconciled.
pub struct MetadataCoordinator {
    kind: MetadataKind,
    mode: UpdateMode,
    writer: MetadataWriter,
    workdir: PathBuf,
    accepted: u64,
}

impl MetadataCoordinator {
    /// Start a fresh document of `kind` inside `workdir`.
    pub fn new(kind: MetadataKind, mode: UpdateMode, workdir: &Path) -> Result<Self> {
        let writer = MetadataWriter::start(kind, workdir.join(format!("{kind}.accepted.xml")))?;
        Ok(Self {
            kind,
            mode,
            writer,
            workdir: workdir.to_path_buf(),
            accepted: 0,
        })
    }

    pub fn kind(&self) -> MetadataKind {
        self.kind
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn accept(&mut self, record: &PackageRecord) -> Result<()> {
        self.writer.accept(record)?;
        self.accepted += 1;
        Ok(())
    }

    /// Close the accepted document and fold in what is already published.
    ///
    /// In [`Rebuild`](UpdateMode::Rebuild) mode `preceding` and `removals` are
    /// ignored. Incrementally, the accepted packages are merged over the
    /// preceding document (or it is copied when nothing was accepted), then
    /// the entries of removed archives are pruned.
    #[instrument(skip_all, fields(kind = %self.kind, mode = %self.mode, accepted = self.accepted))]
    pub fn brush(mut self, preceding: Option<&Path>, removals: &Removals) -> Result<FinalizedDocument> {
        let accepted_path = self.writer.close(self.accepted)?.to_path_buf();
        let path = self.workdir.join(self.kind.file_name());

        let count = match (self.mode, preceding) {
            (UpdateMode::Rebuild, _) | (UpdateMode::Incremental, None) => {
                fs::rename(&accepted_path, &path).or_raise(|| ErrorKind::Io)?;
                self.accepted
            },
            (UpdateMode::Incremental, Some(preceding)) => {
                let mut count = if self.accepted > 0 {
                    merge(&accepted_path, preceding, &path)?
                } else {
                    let count = count_packages(preceding)?;
                    write_counted(DocumentReader::open(preceding)?, &path, count)?;
                    count
                };
                if !removals.is_empty() {
                    count = maid::clean(&path, &PackageFilter::Remove(removals.clone()))?;
                }
                set_count(&path, count)?;
                fs::remove_file(&accepted_path).or_raise(|| ErrorKind::Io)?;
                count
            },
        };
        tracing::info!(count, "finalized metadata document");
        Ok(FinalizedDocument { kind: self.kind, path, count })
    }
}

/// A complete document on local disk, ready to publish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizedDocument {
    pub kind: MetadataKind,
    pub path: PathBuf,
    pub count: u64,
}

impl FinalizedDocument {
    /// Compress and stage the document.
    ///
    /// Both digests are computed in the same pass that streams the bytes into
    /// storage. The upload lands on a hidden temporary key; the returned
    /// [`Publication`] carries the key `naming` derives from the compressed
    /// digest, and [`commit`](Publication::commit) moves it there.
    #[instrument(skip_all, fields(kind = %self.kind, backend = backend.name()))]
    pub async fn save(
        &self,
        backend: &BackendHandle,
        naming: Naming,
        compression: Compression,
        algorithm: Algorithm,
    ) -> Result<Publication> {
        let staged = temp_key(&format!("{}{}", self.kind.file_name(), compression.extension()));
        let (open_checksum, checksum) = match self.upload(backend, &staged, compression, algorithm).await {
            Ok(digests) => digests,
            Err(err) => {
                discard(backend, &staged).await;
                return Err(err);
            },
        };
        let key = naming.published_key(self.kind, &checksum.hex, compression);
        tracing::debug!(staged = %staged.display(), key = %key.display(), size = checksum.size, "staged metadata document");
        Ok(Publication {
            kind: self.kind,
            key,
            staged,
            checksum,
            open_checksum,
            count: self.count,
        })
    }

    async fn upload(
        &self,
        backend: &BackendHandle,
        temp: &Path,
        compression: Compression,
        algorithm: Algorithm,
    ) -> Result<(Checksum, Checksum)> {
        let writer = backend.writer(temp).await.or_raise(|| ErrorKind::Storage)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<(Checksum, Checksum)> {
            let file = File::open(&path).or_raise(|| ErrorKind::Io)?;
            let mut source = HashingReader::new(BufReader::new(file), algorithm);
            let mut encoder = compression
                .encoder(HashingWriter::new(writer, algorithm))
                .or_raise(|| ErrorKind::Compression)?;
            io::copy(&mut source, &mut encoder).or_raise(|| ErrorKind::Io)?;
            let (mut writer, checksum) = encoder.finish().or_raise(|| ErrorKind::Compression)?.finish();
            writer.flush().or_raise(|| ErrorKind::Storage)?;
            Ok((source.finish().1, checksum))
        })
        .await
        .or_raise(|| ErrorKind::Io)?
    }
}

/// A staged document; everything its index entry needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publication {
    pub kind: MetadataKind,
    /// Where the document is published.
    pub key: PathBuf,
    /// Temporary key holding the upload until [`commit`](Self::commit).
    pub staged: PathBuf,
    /// Digest and size of the compressed bytes.
    pub checksum: Checksum,
    /// Digest and size of the uncompressed document.
    pub open_checksum: Checksum,
    pub count: u64,
}

impl Publication {
    /// Record (or replace) this document's entry in the index.
    pub fn register(&self, index: &mut RepositoryIndex) -> Result<()> {
        let mut entry = index.begin_entry(self.kind);
        entry
            .set_gzip_checksum(&self.checksum)
            .set_open_checksum(&self.open_checksum)
            .set_location(&self.key)
            .set_gzip_size(self.checksum.size)
            .set_open_size(self.open_checksum.size);
        entry.close()
    }

    /// Move the staged upload onto its published key.
    pub async fn commit(&self, backend: &BackendHandle) -> Result<()> {
        backend.rename(&self.staged, &self.key).await.or_raise(|| ErrorKind::Storage)?;
        tracing::info!(key = %self.key.display(), size = self.checksum.size, "published metadata document");
        Ok(())
    }

    /// Delete the staged upload, if it is still there.
    pub async fn discard(&self, backend: &BackendHandle) {
        discard(backend, &self.staged).await;
    }
}
