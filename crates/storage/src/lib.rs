//! Blob store for a package repository.
//!
//! Every key is relative to the repository root (`Packages/a-1.0-1.x86_64.rpm`,
//! `repodata/repomd.xml`, `lock-<uuid>`). The metadata engine only ever talks
//! to a [`StorageBackend`]; it never assumes a filesystem.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
