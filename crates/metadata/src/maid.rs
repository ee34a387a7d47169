//! Drops package elements from a finished document.

use crate::document::{PackageElement, filter_into};
use crate::error::Result;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::instrument;

/// Published archives whose entries have to leave the preceding documents.
///
/// Identical archives stored at two paths share a pkgid, so removals are
/// tracked per archive rather than per identifier: primary entries are
/// matched on `location href`, and documents without locations lose one
/// entry of the identifier per removed archive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Removals {
    by_id: HashMap<String, Vec<String>>,
}

impl Removals {
    pub fn insert(&mut self, pkgid: impl Into<String>, location: impl Into<String>) {
        self.by_id.entry(pkgid.into()).or_default().push(location.into());
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.by_id.values().map(Vec::len).sum()
    }

    /// Consume the removal matching `package`, if there is one.
    fn take(&mut self, package: &PackageElement) -> bool {
        let Some(locations) = package.pkgid().and_then(|id| self.by_id.get_mut(&id)) else {
            return false;
        };
        let position = match package.location() {
            Some(href) => locations.iter().position(|l| *l == href),
            None if locations.is_empty() => None,
            None => Some(locations.len() - 1),
        };
        position.map(|i| locations.swap_remove(i)).is_some()
    }
}

impl<I: Into<String>, L: Into<String>> FromIterator<(I, L)> for Removals {
    fn from_iter<T: IntoIterator<Item = (I, L)>>(iter: T) -> Self {
        let mut removals = Self::default();
        for (pkgid, location) in iter {
            removals.insert(pkgid, location);
        }
        removals
    }
}

/// Which packages survive a [`clean`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackageFilter {
    /// Keep only these identifiers.
    Keep(HashSet<String>),
    /// Keep everything except these identifiers.
    Drop(HashSet<String>),
    /// Drop one entry per removed archive.
    Remove(Removals),
}

impl PackageFilter {
    /// Packages with no identifier are kept unless the filter is an allowlist.
    ///
    /// [`Remove`](Self::Remove) is stateful: each removal drops one package.
    pub fn retains(&mut self, package: &PackageElement) -> bool {
        let pkgid = package.pkgid();
        match (self, pkgid.as_deref()) {
            (PackageFilter::Keep(ids), Some(id)) => ids.contains(id),
            (PackageFilter::Keep(_), None) => false,
            (PackageFilter::Drop(ids), Some(id)) => !ids.contains(id),
            (PackageFilter::Drop(_), None) => true,
            (PackageFilter::Remove(removals), _) => !removals.take(package),
        }
    }
}

/// Rewrite `document` to hold only the packages `filter` retains.
///
/// The new document is streamed into a temp file next to the original and
/// renamed over it. The root's count attribute is copied as is: the returned
/// count is the number of packages kept, and writing it back is the
/// caller's job.
#[instrument(skip_all, fields(document = %document.display()))]
pub fn clean(document: &Path, filter: &PackageFilter) -> Result<u64> {
    let mut filter = filter.clone();
    let retained = filter_into(document, document, |package| filter.retains(package))?;
    tracing::debug!(retained, "pruned metadata document");
    Ok(retained)
}
