use repodata_metadata::maid::Removals;
use std::collections::BTreeMap;

/// Repository-relative archive path to package checksum.
pub type ChecksumMap = BTreeMap<String, String>;

/// What an update run has to do to bring the metadata in line with storage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageDiff {
    /// New or changed archives, with their incoming checksum.
    pub to_add: ChecksumMap,
    /// Published archives no longer in storage, with their published checksum.
    pub to_delete: ChecksumMap,
    /// Archives in `to_add` that were already published under another
    /// checksum, with the published one.
    pub replaced: ChecksumMap,
}

impl PackageDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty()
    }

    /// Published entries to prune from the preceding documents: every
    /// deleted archive, and the old record of every changed one.
    ///
    /// Removals name the archive path as well as its identifier, so an
    /// identical copy stored elsewhere keeps its entry.
    pub fn removals(&self) -> Removals {
        self.to_delete
            .iter()
            .chain(&self.replaced)
            .map(|(path, pkgid)| (pkgid.clone(), path.clone()))
            .collect()
    }
}

/// Compare what is in storage with what the metadata describes.
///
/// Only checksum equality decides whether an archive is unchanged; size and
/// timestamps are not considered.
pub fn diff(incoming: &ChecksumMap, published: &ChecksumMap) -> PackageDiff {
    let mut result = PackageDiff::default();
    for (path, checksum) in incoming {
        match published.get(path) {
            Some(previous) if previous == checksum => {},
            Some(previous) => {
                result.to_add.insert(path.clone(), checksum.clone());
                result.replaced.insert(path.clone(), previous.clone());
            },
            None => {
                result.to_add.insert(path.clone(), checksum.clone());
            },
        }
    }
    for (path, checksum) in published {
        if !incoming.contains_key(path) {
            result.to_delete.insert(path.clone(), checksum.clone());
        }
    }
    result
}
