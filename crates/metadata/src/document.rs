//! Package-at-a-time streaming over metadata documents.
//!
//! All three document types share the same outer shape: an XML declaration,
//! one root element carrying a `packages` count attribute, and a flat list of
//! `<package>` children. [`DocumentReader`] yields those children one by one
//! (memory is bounded by the largest single package), and [`DocumentWriter`]
//! emits the same shape. Package events are copied through untouched, so a
//! document written here and read back re-serialises byte for byte.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const PACKAGE_TAG: &[u8] = b"package";
const COUNT_ATTRIBUTE: &str = "packages";

/// One `<package>` element as the raw event sequence that encodes it.
#[derive(Clone, Debug)]
pub struct PackageElement {
    events: Vec<Event<'static>>,
}

impl PackageElement {
    /// Package identifier: the `pkgid` attribute in filelists and other, or
    /// the text of `<checksum pkgid="YES">` in primary.
    pub fn pkgid(&self) -> Option<String> {
        let Some(Event::Start(package) | Event::Empty(package)) = self.events.first() else {
            return None;
        };
        if let Some(id) = attribute(package, b"pkgid") {
            return Some(id);
        }
        let mut in_checksum = false;
        for event in &self.events {
            match event {
                Event::Start(start) if start.name().as_ref() == b"checksum" => {
                    in_checksum = attribute(start, b"pkgid").is_some_and(|v| v.eq_ignore_ascii_case("yes"));
                },
                Event::Text(text) if in_checksum => {
                    return text.unescape().ok().map(|id| id.trim().to_string());
                },
                Event::End(_) => in_checksum = false,
                _ => {},
            }
        }
        None
    }

    /// `href` of the `<location>` element (primary only).
    pub fn location(&self) -> Option<String> {
        self.events.iter().find_map(|event| match event {
            Event::Start(start) | Event::Empty(start) if start.name().as_ref() == b"location" => {
                attribute(start, b"href")
            },
            _ => None,
        })
    }
}

fn attribute(start: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    let attr = start.try_get_attribute(name).ok().flatten()?;
    attr.unescape_value().ok().map(Cow::into_owned)
}

/// Streams `<package>` elements out of a document.
pub struct DocumentReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    root: BytesStart<'static>,
    finished: bool,
}

impl DocumentReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).or_raise(|| ErrorKind::Io)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: BufRead> DocumentReader<R> {
    /// Read up to and including the root element.
    pub fn new(input: R) -> Result<Self> {
        let mut reader = Reader::from_reader(input);
        let mut buf = Vec::new();
        let (root, finished) = loop {
            buf.clear();
            match reader.read_event_into(&mut buf).or_raise(|| ErrorKind::XmlStream)? {
                Event::Start(start) => break (start.into_owned(), false),
                // `<metadata packages="0"/>` has no children to read.
                Event::Empty(start) => break (start.into_owned(), true),
                Event::Eof => exn::bail!(ErrorKind::XmlStream),
                _ => {},
            }
        };
        Ok(Self { reader, buf, root, finished })
    }

    pub fn root(&self) -> &BytesStart<'static> {
        &self.root
    }

    /// The count the document claims to contain.
    pub fn declared_count(&self) -> Option<u64> {
        attribute(&self.root, COUNT_ATTRIBUTE.as_bytes())?.parse().ok()
    }

    pub fn next_package(&mut self) -> Result<Option<PackageElement>> {
        while !self.finished {
            self.buf.clear();
            let event = self.reader.read_event_into(&mut self.buf).or_raise(|| ErrorKind::XmlStream)?.into_owned();
            match event {
                Event::Start(start) if start.name().as_ref() == PACKAGE_TAG => {
                    let mut events = vec![Event::Start(start)];
                    self.read_element(&mut events)?;
                    return Ok(Some(PackageElement { events }));
                },
                Event::Empty(start) if start.name().as_ref() == PACKAGE_TAG => {
                    return Ok(Some(PackageElement { events: vec![Event::Empty(start)] }));
                },
                Event::Start(start) => {
                    tracing::debug!(element = %String::from_utf8_lossy(start.name().as_ref()), "skipping unexpected element");
                    self.read_element(&mut Vec::new())?;
                },
                // Closing tag of the root; the reader already checked it matches.
                Event::End(_) => self.finished = true,
                Event::Eof => exn::bail!(ErrorKind::XmlStream),
                _ => {},
            }
        }
        Ok(None)
    }

    fn read_element(&mut self, events: &mut Vec<Event<'static>>) -> Result<()> {
        let mut depth = 1usize;
        while depth > 0 {
            self.buf.clear();
            let event = self.reader.read_event_into(&mut self.buf).or_raise(|| ErrorKind::XmlStream)?;
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth -= 1,
                Event::Eof => exn::bail!(ErrorKind::XmlStream),
                _ => {},
            }
            events.push(event.into_owned());
        }
        Ok(())
    }
}

/// Emits a document one package at a time.
///
/// Layout is fixed: declaration, root, then each package on its own line.
pub(crate) struct DocumentWriter<W: Write> {
    xml: Writer<W>,
    root: String,
}

impl<W: Write> DocumentWriter<W> {
    pub(crate) fn new(output: W, root: BytesStart<'_>) -> Result<Self> {
        let mut xml = Writer::new(output);
        let name = String::from_utf8_lossy(root.name().as_ref()).into_owned();
        emit(&mut xml, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        raw(&mut xml, b"\n")?;
        emit(&mut xml, Event::Start(root))?;
        Ok(Self { xml, root: name })
    }

    pub(crate) fn write_package(&mut self, package: &PackageElement) -> Result<()> {
        raw(&mut self.xml, b"\n")?;
        for event in &package.events {
            emit(&mut self.xml, event.borrow())?;
        }
        Ok(())
    }

    /// Append an already serialised `<package>` element.
    pub(crate) fn write_raw_package(&mut self, bytes: &[u8]) -> Result<()> {
        raw(&mut self.xml, b"\n")?;
        raw(&mut self.xml, bytes)
    }

    pub(crate) fn finish(mut self) -> Result<W> {
        raw(&mut self.xml, b"\n")?;
        emit(&mut self.xml, Event::End(BytesEnd::new(self.root.as_str())))?;
        raw(&mut self.xml, b"\n")?;
        let mut output = self.xml.into_inner();
        output.flush().or_raise(|| ErrorKind::XmlStream)?;
        Ok(output)
    }
}

pub(crate) fn emit<W: Write>(xml: &mut Writer<W>, event: Event<'_>) -> Result<()> {
    xml.write_event(event).or_raise(|| ErrorKind::XmlStream)
}

fn raw<W: Write>(xml: &mut Writer<W>, bytes: &[u8]) -> Result<()> {
    xml.get_mut().write_all(bytes).or_raise(|| ErrorKind::XmlStream)
}

/// Copy of `root` with its `packages` attribute set to `count`.
pub(crate) fn with_count(root: &BytesStart<'_>, count: u64) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(root.name().as_ref()).into_owned();
    let mut counted = BytesStart::new(name);
    let mut replaced = false;
    for attr in root.attributes().flatten() {
        if attr.key.as_ref() == COUNT_ATTRIBUTE.as_bytes() {
            counted.push_attribute((COUNT_ATTRIBUTE, count.to_string().as_str()));
            replaced = true;
        } else {
            counted.push_attribute(attr);
        }
    }
    if !replaced {
        counted.push_attribute((COUNT_ATTRIBUTE, count.to_string().as_str()));
    }
    counted
}

/// Write through a temp file beside `target`, then rename it into place.
pub(crate) fn replace_atomically<T>(
    target: &Path,
    write: impl FnOnce(&mut BufWriter<NamedTempFile>) -> Result<T>,
) -> Result<T> {
    let dir = target.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let temp = NamedTempFile::new_in(dir).or_raise(|| ErrorKind::Io)?;
    let mut output = BufWriter::new(temp);
    let value = write(&mut output)?;
    let temp = output.into_inner().map_err(|err| err.into_error()).or_raise(|| ErrorKind::Io)?;
    temp.persist(target).or_raise(|| ErrorKind::Io)?;
    Ok(value)
}

/// Stream `source` into `target`, keeping the packages `keep` accepts.
///
/// The root element is copied with its count untouched; returns how many
/// packages were written.
pub(crate) fn filter_into(
    source: &Path,
    target: &Path,
    mut keep: impl FnMut(&PackageElement) -> bool,
) -> Result<u64> {
    let mut reader = DocumentReader::open(source)?;
    replace_atomically(target, |output| {
        let mut writer = DocumentWriter::new(output, reader.root().borrow())?;
        let mut count = 0;
        while let Some(package) = reader.next_package()? {
            if keep(&package) {
                writer.write_package(&package)?;
                count += 1;
            }
        }
        writer.finish()?;
        Ok(count)
    })
}

/// Copy every package from `reader` into `target`, declaring `count`.
pub(crate) fn write_counted<R: BufRead>(mut reader: DocumentReader<R>, target: &Path, count: u64) -> Result<()> {
    replace_atomically(target, |output| {
        let mut writer = DocumentWriter::new(output, with_count(reader.root(), count))?;
        while let Some(package) = reader.next_package()? {
            writer.write_package(&package)?;
        }
        writer.finish()?;
        Ok(())
    })
}

/// Rewrite the root `packages` attribute of the document at `path`.
pub fn set_count(path: &Path, count: u64) -> Result<()> {
    write_counted(DocumentReader::open(path)?, path, count)
}

/// Count the `<package>` elements actually present.
pub fn count_packages(path: &Path) -> Result<u64> {
    let mut reader = DocumentReader::open(path)?;
    let mut count = 0;
    while reader.next_package()?.is_some() {
        count += 1;
    }
    Ok(count)
}

/// `location href → pkgid` for every package of a primary document.
pub fn read_locations(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut reader = DocumentReader::open(path)?;
    let mut locations = BTreeMap::new();
    while let Some(package) = reader.next_package()? {
        match (package.location(), package.pkgid()) {
            (Some(location), Some(pkgid)) => {
                locations.insert(location, pkgid);
            },
            _ => tracing::warn!(path = %path.display(), "published package without location or pkgid"),
        }
    }
    Ok(locations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="2">
<package type="rpm">
  <name>a</name>
  <checksum type="sha256" pkgid="YES">aaa</checksum>
  <location href="Packages/a.rpm"/>
</package>
<package type="rpm">
  <name>b &amp; c</name>
  <checksum type="sha256" pkgid="YES">bbb</checksum>
  <location href="Packages/b&amp;c.rpm"/>
</package>
</metadata>
"#;

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_reader_yields_packages() {
        let mut reader = DocumentReader::new(PRIMARY.as_bytes()).unwrap();
        assert_eq!(reader.declared_count(), Some(2));
        let a = reader.next_package().unwrap().unwrap();
        assert_eq!(a.pkgid().as_deref(), Some("aaa"));
        assert_eq!(a.location().as_deref(), Some("Packages/a.rpm"));
        let b = reader.next_package().unwrap().unwrap();
        assert_eq!(b.location().as_deref(), Some("Packages/b&c.rpm"));
        assert!(reader.next_package().unwrap().is_none());
        assert!(reader.next_package().unwrap().is_none());
    }

    #[test]
    fn test_pkgid_attribute() {
        let xml = r#"<filelists packages="1"><package pkgid="ccc" name="c" arch="noarch"><file>/x</file></package></filelists>"#;
        let mut reader = DocumentReader::new(xml.as_bytes()).unwrap();
        assert_eq!(reader.next_package().unwrap().unwrap().pkgid().as_deref(), Some("ccc"));
    }

    #[test]
    fn test_empty_root() {
        let xml = r#"<?xml version="1.0"?><otherdata xmlns="http://linux.duke.edu/metadata/other" packages="0"/>"#;
        let mut reader = DocumentReader::new(xml.as_bytes()).unwrap();
        assert_eq!(reader.declared_count(), Some(0));
        assert!(reader.next_package().unwrap().is_none());
    }

    #[test]
    fn test_truncated_document() {
        let truncated = &PRIMARY[..PRIMARY.len() / 2];
        let mut reader = DocumentReader::new(truncated.as_bytes()).unwrap();
        let err = loop {
            match reader.next_package() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("truncated document read to completion"),
                Err(err) => break err,
            }
        };
        assert_eq!(*err, ErrorKind::XmlStream);
    }

    #[test]
    fn test_set_count_only_touches_root() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "primary.xml", PRIMARY);
        set_count(&path, 2).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), PRIMARY);
        set_count(&path, 7).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), PRIMARY.replace(r#"packages="2""#, r#"packages="7""#));
        assert_eq!(count_packages(&path).unwrap(), 2);
    }

    #[test]
    fn test_filter_into() {
        let dir = TempDir::new().unwrap();
        let source = write(&dir, "primary.xml", PRIMARY);
        let target = dir.path().join("filtered.xml");
        let kept = filter_into(&source, &target, |p| p.pkgid().as_deref() == Some("bbb")).unwrap();
        assert_eq!(kept, 1);
        assert_eq!(count_packages(&target).unwrap(), 1);
        // Source is left alone.
        assert_eq!(fs::read_to_string(&source).unwrap(), PRIMARY);
    }

    #[test]
    fn test_read_locations() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "primary.xml", PRIMARY);
        let locations = read_locations(&path).unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations["Packages/a.rpm"], "aaa");
        assert_eq!(locations["Packages/b&c.rpm"], "bbb");
    }
}
