//! Storage backend trait and implementations.
//!
//! The [`StorageBackend`] trait is the blob store every other crate works
//! through: archives are read from it, metadata documents and lock markers
//! are written to it.

mod local;
#[cfg(feature = "mock")]
mod mock;
mod ro;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
pub use self::ro::ReadOnlyBackend;
use crate::FileInfo;
use crate::error::Result;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::io::{Read, Write};
use std::path::Path;
use std::pin::Pin;

pub type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;
pub type BoxSyncRead = Box<dyn Read + Send + 'static>;
pub type BoxSyncWrite = Box<dyn Write + Send + 'static>;

/// Unified interface for storage backends.
///
/// All operations are asynchronous; no ordering between concurrent calls on
/// different keys is assumed. Conflicting writers to the same key must be
/// serialised by the caller (the repository lock does this for metadata).
///
/// # Path Handling
/// All keys are relative to the repository root and are validated with
/// [`validate_path`](crate::validate_path) by every implementation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use repodata_storage::{backend::StorageBackend, error::Result};
///
/// async fn index_size(backend: &dyn StorageBackend) -> Result<u64> {
///     let key = Path::new("repodata/repomd.xml");
///     match backend.exists(key).await? {
///         true => Ok(backend.stat(key).await?.size),
///         false => Ok(0),
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// List all keys matching an optional prefix.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream)
    /// into a [`Vec`].
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream metadata of all keys under an optional prefix.
    ///
    /// Prefix matching is component-based: the prefix `repodata` matches
    /// `repodata/repomd.xml` but not `repodata-old/repomd.xml`. A prefix that
    /// does not exist yields an empty stream, not an error.
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// List the keys directly below `prefix` (the repository root when
    /// `None`), without descending further.
    ///
    /// The default implementation filters [`list_stream()`](Self::list_stream);
    /// backends that can list a single level should override it.
    async fn list_children(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        let parent = prefix.unwrap_or(Path::new(""));
        self.list_stream(prefix)
            .try_filter(|info| futures::future::ready(info.path.parent() == Some(parent)))
            .try_collect()
            .await
    }

    /// Check if a key exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read the complete value of a key.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the key
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Open a key for streaming reads.
    ///
    /// Returns a `'static` boxed [`Read`] suitable for use inside
    /// [`spawn_blocking`](tokio::task::spawn_blocking). The async setup
    /// happens before returning.
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use repodata_compress::Compression;
    /// # use repodata_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let key = Path::new("repodata/primary.xml.gz");
    /// let reader = backend.reader(key).await?;
    /// let xml: Vec<u8> = tokio::task::spawn_blocking(move || {
    ///     let mut buf = Vec::new();
    ///     let mut decoder = Compression::from_path(key).wrap_reader(reader).unwrap();
    ///     std::io::Read::read_to_end(&mut decoder, &mut buf).unwrap();
    ///     buf
    /// }).await.unwrap();
    /// # Ok(())
    /// # }
    /// ```
    async fn reader(&self, path: &Path) -> Result<BoxSyncRead>;

    /// Write a complete value, creating or overwriting the key.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Open a key for streaming writes.
    ///
    /// # Notes
    /// - Callers must call `flush()` before dropping; some backends only
    ///   commit the value on flush.
    /// - The value is not atomically visible. Write to a temporary key and
    ///   [`rename`](Self::rename) it into place when readers must never see
    ///   a partial value.
    async fn writer(&self, path: &Path) -> Result<BoxSyncWrite>;

    /// Delete a key.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the key
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Rename/move a key, overwriting the destination.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the source
    /// does not exist.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Get key metadata without reading the value.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}
