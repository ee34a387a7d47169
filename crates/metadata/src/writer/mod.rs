//! Per-type streaming metadata writers.
//!
//! A [`MetadataWriter`] behaves the same for every [`MetadataKind`]; only the
//! package serialiser differs. Each accepted record is rendered into a small
//! buffer and appended to a temp file beside the target, so memory use never
//! depends on how many packages the repository holds.

mod filelists;
mod other;
mod primary;

use crate::MetadataKind;
use crate::document::{DocumentReader, DocumentWriter, emit, with_count, write_counted};
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use repodata_rpm::{Evr, PackageRecord};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

type Xml = Writer<Vec<u8>>;

pub struct MetadataWriter {
    kind: MetadataKind,
    target: PathBuf,
    output: Option<DocumentWriter<BufWriter<NamedTempFile>>>,
}

impl MetadataWriter {
    /// Open the document in its root element.
    ///
    /// Nothing appears at `target` until [`close`](Self::close).
    pub fn start(kind: MetadataKind, target: impl Into<PathBuf>) -> Result<Self> {
        let target = target.into();
        let dir = target.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let temp = NamedTempFile::new_in(dir).or_raise(|| ErrorKind::Io)?;
        let output = DocumentWriter::new(BufWriter::new(temp), root_element(kind, 0))?;
        tracing::debug!(%kind, target = %target.display(), "started metadata document");
        Ok(Self { kind, target, output: Some(output) })
    }

    pub fn kind(&self) -> MetadataKind {
        self.kind
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Append one package element built from `record`.
    pub fn accept(&mut self, record: &PackageRecord) -> Result<()> {
        let output = self.output.as_mut().ok_or_raise(|| ErrorKind::ClosedWriter)?;
        let mut xml = Writer::new_with_indent(Vec::new(), b' ', 2);
        match self.kind {
            MetadataKind::Primary => primary::write_package(&mut xml, record)?,
            MetadataKind::Filelists => filelists::write_package(&mut xml, record)?,
            MetadataKind::Other => other::write_package(&mut xml, record)?,
        }
        output.write_raw_package(&xml.into_inner())
    }

    /// Finish the document declaring `count` packages and rename it onto the
    /// target path.
    ///
    /// The writer does not count; the caller owns the number.
    pub fn close(&mut self, count: u64) -> Result<&Path> {
        let output = self.output.take().ok_or_raise(|| ErrorKind::ClosedWriter)?;
        let temp = output.finish()?.into_inner().map_err(|err| err.into_error()).or_raise(|| ErrorKind::Io)?;
        let written = DocumentReader::new(BufReader::new(temp.reopen().or_raise(|| ErrorKind::Io)?))?;
        write_counted(written, &self.target, count)?;
        tracing::debug!(kind = %self.kind, count, target = %self.target.display(), "closed metadata document");
        Ok(&self.target)
    }

    pub fn is_closed(&self) -> bool {
        self.output.is_none()
    }
}

pub(crate) fn root_element(kind: MetadataKind, count: u64) -> BytesStart<'static> {
    let root = BytesStart::new(kind.root_tag()).with_attributes(kind.namespaces().iter().copied());
    with_count(&root, count)
}

fn start(xml: &mut Xml, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    emit(xml, Event::Start(BytesStart::new(name).with_attributes(attrs.iter().copied())))
}

fn end(xml: &mut Xml, name: &str) -> Result<()> {
    emit(xml, Event::End(BytesEnd::new(name)))
}

fn empty(xml: &mut Xml, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    emit(xml, Event::Empty(BytesStart::new(name).with_attributes(attrs.iter().copied())))
}

/// `<name attrs>value</name>`, or `<name attrs/>` when there is no value.
fn text(xml: &mut Xml, name: &str, attrs: &[(&str, &str)], value: &str) -> Result<()> {
    if value.is_empty() {
        return empty(xml, name, attrs);
    }
    start(xml, name, attrs)?;
    emit(xml, Event::Text(BytesText::new(value)))?;
    end(xml, name)
}

fn version(xml: &mut Xml, evr: &Evr) -> Result<()> {
    let epoch = evr.epoch.to_string();
    empty(xml, "version", &[("epoch", &epoch), ("ver", &evr.version), ("rel", &evr.release)])
}


#[cfg(test)]
mod tests {
    use super::testing::record;
    use super::*;
    use crate::document::count_packages;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    #[rstest]
    #[case(MetadataKind::Primary)]
    #[case(MetadataKind::Filelists)]
    #[case(MetadataKind::Other)]
    fn test_count_matches_accepted(#[case] kind: MetadataKind) {
        let dir = TempDir::new().unwrap();
        let mut writer = MetadataWriter::start(kind, dir.path().join(kind.file_name())).unwrap();
        assert!(!writer.target().exists());
        for (name, id) in [("a", "aaa"), ("b", "bbb"), ("c", "ccc")] {
            writer.accept(&record(name, id)).unwrap();
        }
        let path = writer.close(3).unwrap().to_path_buf();
        assert_eq!(count_packages(&path).unwrap(), 3);
        let reader = DocumentReader::open(&path).unwrap();
        assert_eq!(reader.declared_count(), Some(3));
        // Only the target remains; the temp file is gone.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[rstest]
    #[case(MetadataKind::Primary, "<metadata xmlns=\"http://linux.duke.edu/metadata/common\" xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\" packages=\"0\">")]
    #[case(MetadataKind::Filelists, "<filelists xmlns=\"http://linux.duke.edu/metadata/filelists\" packages=\"0\">")]
    #[case(MetadataKind::Other, "<otherdata xmlns=\"http://linux.duke.edu/metadata/other\" packages=\"0\">")]
    fn test_empty_document(#[case] kind: MetadataKind, #[case] root: &str) {
        let dir = TempDir::new().unwrap();
        let mut writer = MetadataWriter::start(kind, dir.path().join(kind.file_name())).unwrap();
        let path = writer.close(0).unwrap().to_path_buf();
        let expected = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{root}\n</{}>\n", kind.root_tag());
        assert_eq!(fs::read_to_string(path).unwrap(), expected);
    }

    #[test]
    fn test_accept_after_close() {
        let dir = TempDir::new().unwrap();
        let mut writer = MetadataWriter::start(MetadataKind::Other, dir.path().join("other.xml")).unwrap();
        writer.close(0).unwrap();
        assert!(writer.is_closed());
        let err = writer.accept(&record("a", "aaa")).unwrap_err();
        assert_eq!(*err, ErrorKind::ClosedWriter);
        let err = writer.close(0).unwrap_err();
        assert_eq!(*err, ErrorKind::ClosedWriter);
    }

    #[test]
    fn test_dropped_writer_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let mut writer = MetadataWriter::start(MetadataKind::Primary, dir.path().join("primary.xml")).unwrap();
        writer.accept(&record("a", "aaa")).unwrap();
        drop(writer);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
