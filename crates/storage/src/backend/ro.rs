//! Read-only storage backend.
//!
//! Wraps another backend for dry runs: reads pass through, mutations are
//! logged and reported as successful without touching the inner backend.

use async_trait::async_trait;
use std::path::Path;

use crate::backend::{BoxSyncRead, BoxSyncWrite, FileInfoStream};
use crate::{BackendHandle, FileInfo, StorageBackend, error::Result};

/// Read-only storage backend.
///
/// Silently drops every write, delete and rename, logging an
/// [`info event`](tracing::Event) for each.
///
/// A dry run that renames a temporary key into place will then fail to
/// `stat` it; callers running against this backend must not rely on
/// reading back what they wrote.
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        self.inner.list_stream(prefix)
    }

    async fn list_children(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.inner.list_children(prefix).await
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn reader(&self, path: &Path) -> Result<BoxSyncRead> {
        self.inner.reader(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        tracing::info!(path = %path.display(), bytes = data.len(), "Skipping write during dry run");
        Ok(())
    }

    async fn writer(&self, path: &Path) -> Result<BoxSyncWrite> {
        tracing::info!(path = %path.display(), "Skipping streamed write during dry run");
        Ok(Box::new(std::io::sink()))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "Skipping delete during dry run");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        tracing::info!(from = %from.display(), to = %to.display(), "Skipping rename during dry run");
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.inner.stat(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_writes_are_dropped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let inner: BackendHandle = Arc::new(LocalBackend::new("local", temp_dir.path()).unwrap());
        inner.write(Path::new("repodata/repomd.xml"), b"old").await.unwrap();
        let backend = ReadOnlyBackend::new(Arc::clone(&inner));
        backend.write(Path::new("repodata/repomd.xml"), b"new").await.unwrap();
        backend.delete(Path::new("repodata/repomd.xml")).await.unwrap();
        assert_eq!(backend.read(Path::new("repodata/repomd.xml")).await.unwrap(), b"old");
        assert!(!inner.exists(Path::new("lock-abc")).await.unwrap());
    }
}
