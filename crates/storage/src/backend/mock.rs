//! In-memory storage backend for testing.

use super::{BoxSyncRead, BoxSyncWrite, FileInfoStream};
use crate::FileInfo;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use time::OffsetDateTime;

type Objects = Arc<RwLock<HashMap<PathBuf, (OffsetDateTime, Vec<u8>)>>>;

/// In-memory storage backend for testing.
///
/// Objects live in a `HashMap` behind a synchronous [`RwLock`] (streaming
/// writers commit from blocking code), and every trait method works on
/// `&self`.
///
/// # Examples
///
/// ```
/// use repodata_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("Packages/a-1.0-1.noarch.rpm", b"rpm bytes")]);
/// assert!(backend.exists(Path::new("Packages/a-1.0-1.noarch.rpm")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    objects: Objects,
}

impl MockBackend {
    /// Create a mock backend pre-populated with objects.
    ///
    /// Panics if any key fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            objects: Arc::new(RwLock::new(map)),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Snapshot of every key currently stored, sorted.
    pub fn keys(&self) -> Vec<PathBuf> {
        let mut keys: Vec<_> = self.objects.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect();
        keys.sort();
        keys
    }

    fn get(&self, path: &Path) -> Result<(OffsetDateTime, Vec<u8>)> {
        let path = validate_path(path)?;
        let guard = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

/// Buffers writes and commits the whole value on `flush()`, like an object
/// store upload.
struct MockWriter {
    path: PathBuf,
    buffer: Vec<u8>,
    objects: Objects,
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut guard = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(self.path.clone(), (OffsetDateTime::now_utc(), self.buffer.clone()));
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };
        // Snapshot under the lock; never hold it across a yield point.
        let entries: Vec<FileInfo> = {
            let guard = self.objects.read().unwrap_or_else(PoisonError::into_inner);
            guard
                .iter()
                .filter(|(path, _)| match &validated_prefix {
                    Some(pfx) => path.starts_with(pfx),
                    None => true,
                })
                .map(|(path, (modified, data))| FileInfo::new(path.clone(), data.len() as u64, *modified))
                .collect()
        };
        Box::pin(stream! {
            for entry in entries {
                yield Ok(entry);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.objects.read().unwrap_or_else(PoisonError::into_inner).contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(self.get(path)?.1)
    }

    async fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        Ok(Box::new(Cursor::new(self.get(path)?.1)))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        let mut guard = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(path, (OffsetDateTime::now_utc(), data.to_vec()));
        Ok(())
    }

    async fn writer(&self, path: &Path) -> Result<BoxSyncWrite> {
        let path = validate_path(path)?;
        Ok(Box::new(MockWriter { path, buffer: Vec::new(), objects: Arc::clone(&self.objects) }))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        let mut guard = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        guard.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from = validate_path(from)?;
        let to = validate_path(to)?;
        let mut guard = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        let data = guard.remove(&from).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(from)))?;
        guard.insert(to, data);
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let (modified, data) = self.get(path)?;
        Ok(FileInfo::new(validate_path(path)?, data.len() as u64, modified))
    }
}
