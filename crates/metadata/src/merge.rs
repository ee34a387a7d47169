//! Structural merge of two documents of the same type.

use crate::document::{DocumentReader, DocumentWriter, replace_atomically};
use crate::error::Result;
use std::collections::HashSet;
use std::path::Path;
use tracing::instrument;

/// Write every package of `current`, followed by the packages of `preceding`,
/// into `output`.
///
/// A preceding primary entry with the same pkgid and location as one in
/// `current` is superseded by it. Entries that only share a pkgid are
/// distinct archives and both stay. The root element (and its count
/// attribute) is taken from `current`. Returns the number of packages
/// written.
#[instrument(skip_all, fields(current = %current.display(), preceding = %preceding.display()))]
pub fn merge(current: &Path, preceding: &Path, output: &Path) -> Result<u64> {
    let mut supplied = HashSet::new();
    let mut reader = DocumentReader::open(current)?;
    while let Some(package) = reader.next_package()? {
        if let (Some(id), Some(location)) = (package.pkgid(), package.location()) {
            supplied.insert((id, location));
        }
    }

    let mut current = DocumentReader::open(current)?;
    let mut preceding = DocumentReader::open(preceding)?;
    let (mut fresh, mut carried) = (0u64, 0u64);
    replace_atomically(output, |out| {
        let mut writer = DocumentWriter::new(out, current.root().borrow())?;
        while let Some(package) = current.next_package()? {
            writer.write_package(&package)?;
            fresh += 1;
        }
        while let Some(package) = preceding.next_package()? {
            if let (Some(id), Some(location)) = (package.pkgid(), package.location())
                && supplied.contains(&(id, location))
            {
                continue;
            }
            writer.write_package(&package)?;
            carried += 1;
        }
        writer.finish()?;
        Ok(())
    })?;
    tracing::debug!(fresh, carried, "merged metadata documents");
    Ok(fresh + carried)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetadataKind;
    use crate::document::{DocumentReader, count_packages};
    use crate::writer::MetadataWriter;
    use crate::writer::testing::record;
    use tempfile::TempDir;

    fn document(dir: &TempDir, name: &str, packages: &[(&str, &str)]) -> std::path::PathBuf {
        let mut writer = MetadataWriter::start(MetadataKind::Primary, dir.path().join(name)).unwrap();
        for (name, id) in packages {
            writer.accept(&record(name, id)).unwrap();
        }
        writer.close(packages.len() as u64).unwrap().to_path_buf()
    }

    fn pkgids(path: &Path) -> Vec<String> {
        let mut reader = DocumentReader::open(path).unwrap();
        let mut ids = Vec::new();
        while let Some(package) = reader.next_package().unwrap() {
            ids.push(package.pkgid().unwrap());
        }
        ids
    }

    #[test]
    fn test_current_supersedes_same_archive() {
        let dir = TempDir::new().unwrap();
        let preceding = document(&dir, "preceding.xml", &[("a", "aaa"), ("b", "bbb")]);
        let current = document(&dir, "current.xml", &[("b", "bbb"), ("c", "ccc")]);
        let output = dir.path().join("merged.xml");

        assert_eq!(merge(&current, &preceding, &output).unwrap(), 3);
        assert_eq!(pkgids(&output), vec!["bbb", "ccc", "aaa"]);
        assert_eq!(count_packages(&output).unwrap(), 3);
    }

    #[test]
    fn test_identical_archive_at_another_path_is_kept() {
        let dir = TempDir::new().unwrap();
        let preceding = document(&dir, "preceding.xml", &[("a", "aaa")]);
        let current = document(&dir, "current.xml", &[("copy", "aaa")]);
        let output = dir.path().join("merged.xml");

        assert_eq!(merge(&current, &preceding, &output).unwrap(), 2);
        let mut reader = DocumentReader::open(&output).unwrap();
        let first = reader.next_package().unwrap().unwrap();
        assert_eq!(first.location().as_deref(), Some("Packages/copy-1.0-1.x86_64.rpm"));
        let second = reader.next_package().unwrap().unwrap();
        assert_eq!(second.location().as_deref(), Some("Packages/a-1.0-1.x86_64.rpm"));
    }

    #[test]
    fn test_empty_current() {
        let dir = TempDir::new().unwrap();
        let preceding = document(&dir, "preceding.xml", &[("a", "aaa")]);
        let current = document(&dir, "current.xml", &[]);
        let output = dir.path().join("merged.xml");
        assert_eq!(merge(&current, &preceding, &output).unwrap(), 1);
        assert_eq!(pkgids(&output), vec!["aaa"]);
    }
}
