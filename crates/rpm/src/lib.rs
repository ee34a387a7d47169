//! Package records for repository metadata.
//!
//! The metadata writers only ever see a [`PackageRecord`]: an immutable,
//! fully-typed view of one archive. This crate builds those records:
//!
//! - [`header`] parses the RPM lead, signature and main header into a
//!   [`TagTable`](tags::TagTable), the typed-accessor view over the raw index.
//! - [`PackageRecord::from_tags`] maps a tag table onto record fields.
//! - [`HeaderReader`] is the seam the repository update consumes;
//!   [`StorageHeaderReader`] implements it over a storage backend.

pub mod error;
pub mod header;
mod reader;
mod record;
pub mod tags;

pub use crate::reader::{HeaderReader, StorageHeaderReader};
pub use crate::record::{
    ChangelogEntry, Dependency, DependencyFlags, Evr, FileKind, HeaderRange, PackageFile, PackageRecord, SourceFacts,
};
