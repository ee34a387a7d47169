//! Metadata engine for an RPM repository.
//!
//! Produces the three package-description documents (`primary`, `filelists`,
//! `other`) and the `repomd.xml` index that points at them by checksum.
//!
//! A run goes through a [`MetadataCoordinator`] per document type:
//!
//! 1. [`accept`](MetadataCoordinator::accept) every new package record; the
//!    coordinator streams it through its [`MetadataWriter`].
//! 2. [`brush`](MetadataCoordinator::brush) merges with the preceding
//!    published document (found by [`PrecedingMetadata`]), prunes removed
//!    packages with the [`maid`], and fixes the package count.
//! 3. [`save`](FinalizedDocument::save) compresses and stages the document;
//!    the resulting [`Publication`] knows the key the [`Naming`] policy gives
//!    it and is registered in the [`RepositoryIndex`].
//! 4. [`close`](RepositoryIndex::close) stages the new `repomd.xml`, moves
//!    every staged document into place, then the index itself. Until then
//!    nothing clients read has changed.

mod coordinator;
pub mod document;
pub mod error;
mod kind;
mod locator;
pub mod maid;
pub mod merge;
mod naming;
mod repomd;
mod writer;

pub use crate::coordinator::{FinalizedDocument, MetadataCoordinator, Publication, UpdateMode};
pub use crate::kind::MetadataKind;
pub use crate::locator::{PrecedingMetadata, remove_stale};
pub use crate::maid::Removals;
pub use crate::naming::Naming;
pub use crate::repomd::{EntryDigest, EntryHandle, IndexEntry, RepositoryIndex};
pub use crate::writer::MetadataWriter;
use repodata_storage::BackendHandle;
use repodata_storage::error::ErrorKind as StorageErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Storage prefix holding every metadata document.
pub const REPODATA_DIR: &str = "repodata";
/// Storage key of the repository index.
pub const REPOMD_KEY: &str = "repodata/repomd.xml";

/// Hidden, unique key for an upload that is renamed into place afterwards.
pub(crate) fn temp_key(name: &str) -> PathBuf {
    PathBuf::from(REPODATA_DIR).join(format!(".{}-{name}.tmp", Uuid::new_v4()))
}

/// Best-effort removal of a temporary key; failures are only logged.
pub(crate) async fn discard(backend: &BackendHandle, key: &Path) {
    match backend.delete(key).await {
        Ok(()) => tracing::debug!(key = %key.display(), "discarded temporary upload"),
        Err(err) if matches!(*err, StorageErrorKind::NotFound(_)) => {},
        Err(err) => tracing::warn!(key = %key.display(), error = %err, "failed to discard temporary upload"),
    }
}

pub(crate) fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}
