//! Discover archives in storage and the packages the metadata describes.

use crate::diff::ChecksumMap;
use crate::error::{ErrorKind, Result};
use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, StreamExt, TryStreamExt};
use repodata_checksum::{Algorithm, Checksum};
use repodata_metadata::REPODATA_DIR;
use repodata_metadata::document::read_locations;
use repodata_storage::BackendHandle;
use std::path::{Path, PathBuf};
use std::pin::pin;

/// Archives digested at the same time.
pub const MAX_DIGEST_CONCURRENCY: usize = 16;

/// Progress events emitted by [`scan`].
///
/// `Started` comes first and `Complete` last, each exactly once;
/// `DiscoveryComplete` comes once before any `Digested`. An error ends the
/// stream without `Complete`.
#[derive(Debug)]
pub enum ScanEvent {
    Started,
    /// Every archive has been listed; the total is now known.
    DiscoveryComplete(u64),
    Digested { path: PathBuf, checksum: Checksum },
    Complete,
}

/// Whether a storage key is a package archive the metadata should describe.
pub fn is_package(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "rpm") && !path.starts_with(REPODATA_DIR)
}

/// Stream the digest of every `*.rpm` key under `prefix`.
pub fn scan<'a>(
    backend: &'a BackendHandle,
    prefix: Option<&'a Path>,
    algorithm: Algorithm,
) -> impl Stream<Item = Result<ScanEvent>> + 'a {
    stream!({
        yield Ok(ScanEvent::Started);

        let listed: Result<Vec<PathBuf>> = backend
            .list_stream(prefix)
            .try_filter_map(|info| async move { Ok(is_package(&info.path).then_some(info.path)) })
            .try_collect()
            .await
            .or_raise(|| ErrorKind::Storage);
        let paths = match listed {
            Ok(paths) => paths,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        yield Ok(ScanEvent::DiscoveryComplete(u64::try_from(paths.len()).unwrap_or(0)));

        let mut digests = futures::stream::iter(paths)
            .map(|path| digest(backend, path, algorithm))
            .buffer_unordered(MAX_DIGEST_CONCURRENCY);
        while let Some(result) = digests.next().await {
            match result {
                Ok((path, checksum)) => yield Ok(ScanEvent::Digested { path, checksum }),
                Err(e) => {
                    yield Err(e);
                    return;
                },
            }
        }

        yield Ok(ScanEvent::Complete);
    })
}

async fn digest(backend: &BackendHandle, path: PathBuf, algorithm: Algorithm) -> Result<(PathBuf, Checksum)> {
    let reader = backend.reader(&path).await.or_raise(|| ErrorKind::Storage)?;
    let checksum = tokio::task::spawn_blocking(move || algorithm.digest_reader(reader))
        .await
        .or_raise(|| ErrorKind::Io)?
        .or_raise(|| ErrorKind::Checksum)?;
    tracing::trace!(path = %path.display(), checksum = %checksum.hex, "digested archive");
    Ok((path, checksum))
}

/// Path to checksum of every archive currently in storage.
pub async fn incoming_checksums(
    backend: &BackendHandle,
    prefix: Option<&Path>,
    algorithm: Algorithm,
) -> Result<ChecksumMap> {
    let mut events = pin!(scan(backend, prefix, algorithm));
    let mut checksums = ChecksumMap::new();
    while let Some(event) = events.next().await {
        match event? {
            ScanEvent::DiscoveryComplete(total) => tracing::info!(total, "discovered package archives"),
            ScanEvent::Digested { path, checksum } => {
                checksums.insert(path.to_string_lossy().into_owned(), checksum.hex);
            },
            ScanEvent::Started | ScanEvent::Complete => {},
        }
    }
    Ok(checksums)
}

/// Location to package identifier of every package in a decompressed
/// `primary` document. No document means nothing is published yet.
pub async fn published_checksums(primary: Option<PathBuf>) -> Result<ChecksumMap> {
    let Some(primary) = primary else {
        return Ok(ChecksumMap::new());
    };
    tokio::task::spawn_blocking(move || read_locations(&primary))
        .await
        .or_raise(|| ErrorKind::Io)?
        .or_raise(|| ErrorKind::Metadata)
}
