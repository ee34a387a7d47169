//! Update runs over an RPM repository.
//!
//! An [`Updater`] takes the [`RepositoryLock`], compares the archives in
//! storage with what the published `primary` document describes
//! ([`diff`]), feeds new and changed packages to one
//! [`MetadataCoordinator`](repodata_metadata::MetadataCoordinator) per
//! document type and publishes the result under a fresh `repomd.xml`.

pub mod diff;
pub mod error;
pub mod lock;
pub mod scan;
mod update;

pub use crate::diff::{ChecksumMap, PackageDiff, diff};
pub use crate::lock::RepositoryLock;
pub use crate::update::{MAX_READ_CONCURRENCY, UpdateOptions, UpdateReport, Updater};
