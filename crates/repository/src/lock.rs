//! Advisory repository lock.
//!
//! A lock is a marker key `lock-<uuid>` in the repository root. It only
//! constrains runs of this engine; any other writer to the store ignores it.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use regex::Regex;
use repodata_storage::BackendHandle;
use repodata_storage::error::ErrorKind as StorageErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::instrument;
use uuid::Uuid;

static MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^lock-[a-z0-9-]{36}$").unwrap());

pub fn is_marker(path: &Path) -> bool {
    path.parent().is_some_and(|parent| parent.as_os_str().is_empty())
        && path.to_str().is_some_and(|name| MARKER.is_match(name))
}

pub struct RepositoryLock {
    backend: BackendHandle,
    marker: Option<PathBuf>,
}

impl RepositoryLock {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend, marker: None }
    }

    pub fn is_locked(&self) -> bool {
        self.marker.is_some()
    }

    pub fn marker(&self) -> Option<&Path> {
        self.marker.as_deref()
    }

    /// Markers live in the repository root, so only that level is listed.
    async fn markers(&self) -> Result<Vec<PathBuf>> {
        let listed = self.backend.list_children(None).await.or_raise(|| ErrorKind::Storage)?;
        Ok(listed.into_iter().map(|info| info.path).filter(|path| is_marker(path)).collect())
    }

    /// Take the lock, or fail with
    /// [`RepositoryLocked`](ErrorKind::RepositoryLocked).
    ///
    /// The marker list is read again after writing our own marker; if a
    /// concurrent run wrote one in between, our marker is withdrawn and this
    /// run fails too. Our marker is also withdrawn when that second listing
    /// fails.
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn lock(&mut self) -> Result<()> {
        if self.marker.is_some() {
            return Ok(());
        }
        let existing = self.markers().await?;
        if let Some(holder) = existing.first() {
            tracing::warn!(marker = %holder.display(), "repository is locked");
            exn::bail!(ErrorKind::RepositoryLocked);
        }

        let marker = PathBuf::from(format!("lock-{}", Uuid::new_v4()));
        self.backend.write(&marker, b"").await.or_raise(|| ErrorKind::Storage)?;
        let others: Vec<_> = match self.markers().await {
            Ok(markers) => markers.into_iter().filter(|m| m != &marker).collect(),
            Err(err) => {
                self.withdraw(&marker).await;
                return Err(err);
            },
        };
        if !others.is_empty() {
            tracing::warn!(contenders = others.len(), "lost the race for the repository lock");
            self.withdraw(&marker).await;
            exn::bail!(ErrorKind::RepositoryLocked);
        }
        tracing::debug!(marker = %marker.display(), "acquired repository lock");
        self.marker = Some(marker);
        Ok(())
    }

    async fn withdraw(&self, marker: &Path) {
        if let Err(err) = self.backend.delete(marker).await {
            tracing::error!(marker = %marker.display(), error = %err, "failed to withdraw lock marker");
        }
    }

    /// Release the lock. Releasing a lock that is not held does nothing.
    #[instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn unlock(&mut self) -> Result<()> {
        let Some(marker) = self.marker.take() else {
            return Ok(());
        };
        match self.backend.delete(&marker).await {
            Ok(()) => {},
            Err(err) if matches!(*err, StorageErrorKind::NotFound(_)) => {
                tracing::warn!(marker = %marker.display(), "lock marker was already gone");
            },
            Err(err) => {
                self.marker = Some(marker);
                return Err(err).or_raise(|| ErrorKind::Storage);
            },
        }
        tracing::debug!(marker = %marker.display(), "released repository lock");
        Ok(())
    }
}

impl Drop for RepositoryLock {
    /// A run that is cancelled while holding the lock still releases it, as
    /// long as a runtime is around to do so.
    fn drop(&mut self) {
        let Some(marker) = self.marker.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let backend = self.backend.clone();
                handle.spawn(async move {
                    if let Err(err) = backend.delete(&marker).await {
                        tracing::error!(marker = %marker.display(), error = %err, "failed to release abandoned lock");
                    }
                });
            },
            Err(_) => tracing::error!(marker = %marker.display(), "lock dropped outside a runtime; remove it by hand"),
        }
    }
}
