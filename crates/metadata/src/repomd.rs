//! The `repomd.xml` repository index.
//!
//! Clients fetch this file first and use it to find, and verify, every other
//! document. Entries for types this crate does not produce (`group`,
//! `updateinfo`, ...) are read and written back so a run never loses them.
//! The exception is the sqlite variant of a rewritten type (`primary_db`,
//! ...): clients prefer it, and it would still describe the old packages.

use crate::document::emit;
use crate::error::{ErrorKind, Result};
use crate::kind::{REPO_NS, RPM_NS};
use crate::coordinator::Publication;
use crate::{MetadataKind, REPOMD_KEY, discard, temp_key};
use exn::{OptionExt, ResultExt};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use repodata_checksum::Checksum;
use repodata_storage::BackendHandle;
use std::borrow::Cow;
use std::path::Path;
use time::OffsetDateTime;
use tracing::instrument;

/// A digest as recorded in the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryDigest {
    pub algorithm: String,
    pub hex: String,
}

impl From<&Checksum> for EntryDigest {
    fn from(checksum: &Checksum) -> Self {
        Self {
            algorithm: checksum.algorithm.as_str().to_string(),
            hex: checksum.hex.clone(),
        }
    }
}

/// One `<data>` element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub data_type: String,
    /// Digest of the published (compressed) file.
    pub checksum: EntryDigest,
    /// Digest of the uncompressed document.
    pub open_checksum: Option<EntryDigest>,
    pub location: String,
    pub timestamp: i64,
    pub size: u64,
    pub open_size: Option<u64>,
}

#[derive(Default)]
struct PartialEntry {
    data_type: String,
    checksum: Option<EntryDigest>,
    open_checksum: Option<EntryDigest>,
    location: Option<String>,
    timestamp: Option<i64>,
    size: Option<u64>,
    open_size: Option<u64>,
}

impl PartialEntry {
    fn complete(self) -> Option<IndexEntry> {
        Some(IndexEntry {
            data_type: self.data_type,
            checksum: self.checksum?,
            open_checksum: self.open_checksum,
            location: self.location?,
            timestamp: self.timestamp.unwrap_or(0),
            size: self.size.unwrap_or(0),
            open_size: self.open_size,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepositoryIndex {
    revision: Option<String>,
    entries: Vec<IndexEntry>,
}

impl RepositoryIndex {
    /// Load the published index, or start an empty one for a new repository.
    #[instrument(skip_all, fields(backend = backend.name()))]
    pub async fn create_or_load(backend: &BackendHandle) -> Result<Self> {
        let key = Path::new(REPOMD_KEY);
        if !backend.exists(key).await.or_raise(|| ErrorKind::Storage)? {
            tracing::debug!("no published index, starting fresh");
            return Ok(Self::default());
        }
        let bytes = backend.read(key).await.or_raise(|| ErrorKind::Storage)?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        let mut index = Self::default();
        let mut current: Option<PartialEntry> = None;
        let mut field: Option<Vec<u8>> = None;
        let mut algorithm = String::new();
        loop {
            match reader.read_event_into(&mut buf).or_raise(|| ErrorKind::XmlStream)? {
                Event::Start(start) | Event::Empty(start) if start.name().as_ref() == b"location" => {
                    if let Some(entry) = current.as_mut() {
                        entry.location = attribute(&start, b"href");
                    }
                },
                Event::Start(start) => {
                    let name = start.name().as_ref().to_vec();
                    match name.as_slice() {
                        b"data" => {
                            current = Some(PartialEntry {
                                data_type: attribute(&start, b"type").unwrap_or_default(),
                                ..PartialEntry::default()
                            });
                        },
                        b"checksum" | b"open-checksum" => algorithm = attribute(&start, b"type").unwrap_or_default(),
                        _ => {},
                    }
                    field = Some(name);
                },
                Event::Text(text) => {
                    let value = text.unescape().or_raise(|| ErrorKind::XmlStream)?.into_owned();
                    let digest = || EntryDigest { algorithm: algorithm.clone(), hex: value.clone() };
                    match (field.as_deref(), current.as_mut()) {
                        (Some(b"revision"), _) => index.revision = Some(value.clone()),
                        (Some(b"checksum"), Some(entry)) => entry.checksum = Some(digest()),
                        (Some(b"open-checksum"), Some(entry)) => entry.open_checksum = Some(digest()),
                        (Some(b"timestamp"), Some(entry)) => entry.timestamp = value.parse().ok(),
                        (Some(b"size"), Some(entry)) => entry.size = value.parse().ok(),
                        (Some(b"open-size"), Some(entry)) => entry.open_size = value.parse().ok(),
                        _ => {},
                    }
                },
                Event::End(end) => {
                    if end.name().as_ref() == b"data"
                        && let Some(partial) = current.take()
                    {
                        let data_type = partial.data_type.clone();
                        match partial.complete() {
                            Some(entry) => index.upsert(entry),
                            None => tracing::warn!(%data_type, "dropping incomplete index entry"),
                        }
                    }
                    field = None;
                },
                Event::Eof => break,
                _ => {},
            }
            buf.clear();
        }
        Ok(index)
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn entry(&self, data_type: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|entry| entry.data_type == data_type)
    }

    /// Published location of a document type, if registered.
    pub fn location(&self, kind: MetadataKind) -> Option<&str> {
        self.entry(kind.name()).map(|entry| entry.location.as_str())
    }

    /// Start (re-)registering the document of `kind`.
    pub fn begin_entry(&mut self, kind: MetadataKind) -> EntryHandle<'_> {
        EntryHandle {
            index: self,
            data_type: kind.name(),
            gzip_checksum: None,
            open_checksum: None,
            location: None,
            gzip_size: None,
            open_size: None,
        }
    }

    fn upsert(&mut self, entry: IndexEntry) {
        match self.entries.iter_mut().find(|existing| existing.data_type == entry.data_type) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut xml = Writer::new_with_indent(Vec::new(), b' ', 2);
        emit(&mut xml, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let root = BytesStart::new("repomd").with_attributes([("xmlns", REPO_NS), ("xmlns:rpm", RPM_NS)]);
        emit(&mut xml, Event::Start(root))?;
        if let Some(revision) = &self.revision {
            text(&mut xml, "revision", &[], revision)?;
        }
        for entry in &self.entries {
            emit(&mut xml, Event::Start(BytesStart::new("data").with_attributes([("type", entry.data_type.as_str())])))?;
            text(&mut xml, "checksum", &[("type", &entry.checksum.algorithm)], &entry.checksum.hex)?;
            if let Some(open) = &entry.open_checksum {
                text(&mut xml, "open-checksum", &[("type", &open.algorithm)], &open.hex)?;
            }
            emit(&mut xml, Event::Empty(BytesStart::new("location").with_attributes([("href", entry.location.as_str())])))?;
            text(&mut xml, "timestamp", &[], &entry.timestamp.to_string())?;
            text(&mut xml, "size", &[], &entry.size.to_string())?;
            if let Some(open_size) = entry.open_size {
                text(&mut xml, "open-size", &[], &open_size.to_string())?;
            }
            emit(&mut xml, Event::End(BytesEnd::new("data")))?;
        }
        emit(&mut xml, Event::End(BytesEnd::new("repomd")))?;
        let mut bytes = xml.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Persist the index with a fresh revision, publishing `documents` with
    /// it.
    ///
    /// The index is written to a temporary key first. Only once that
    /// succeeded are the staged documents moved onto their published keys,
    /// and finally the index onto `repodata/repomd.xml`. A failed write
    /// leaves every published file as it was.
    #[instrument(skip_all, fields(backend = backend.name(), documents = documents.len()))]
    pub async fn close(&mut self, backend: &BackendHandle, documents: &[Publication]) -> Result<()> {
        self.revision = Some(OffsetDateTime::now_utc().unix_timestamp().to_string());
        let bytes = self.to_xml()?;
        let temp = temp_key("repomd.xml");
        if let Err(err) = backend.write(&temp, &bytes).await {
            discard(backend, &temp).await;
            return Err(err).or_raise(|| ErrorKind::Storage);
        }
        let committed = async {
            for document in documents {
                document.commit(backend).await?;
            }
            backend.rename(&temp, Path::new(REPOMD_KEY)).await.or_raise(|| ErrorKind::Storage)
        };
        if let Err(err) = committed.await {
            discard(backend, &temp).await;
            return Err(err);
        }
        tracing::info!(revision = self.revision.as_deref(), entries = self.entries.len(), "published repository index");
        Ok(())
    }
}

/// Collects the fields of one index entry; [`close`](Self::close) registers it.
pub struct EntryHandle<'a> {
    index: &'a mut RepositoryIndex,
    data_type: &'static str,
    gzip_checksum: Option<EntryDigest>,
    open_checksum: Option<EntryDigest>,
    location: Option<String>,
    gzip_size: Option<u64>,
    open_size: Option<u64>,
}

impl EntryHandle<'_> {
    pub fn set_gzip_checksum(&mut self, checksum: &Checksum) -> &mut Self {
        self.gzip_checksum = Some(checksum.into());
        self
    }

    pub fn set_open_checksum(&mut self, checksum: &Checksum) -> &mut Self {
        self.open_checksum = Some(checksum.into());
        self
    }

    pub fn set_location(&mut self, location: &Path) -> &mut Self {
        self.location = Some(location.to_string_lossy().into_owned());
        self
    }

    pub fn set_gzip_size(&mut self, size: u64) -> &mut Self {
        self.gzip_size = Some(size);
        self
    }

    pub fn set_open_size(&mut self, size: u64) -> &mut Self {
        self.open_size = Some(size);
        self
    }

    /// Replace any previous entry of the same type.
    pub fn close(self) -> Result<()> {
        let entry = IndexEntry {
            data_type: self.data_type.to_string(),
            checksum: self.gzip_checksum.ok_or_raise(|| ErrorKind::IncompleteIndexEntry("checksum"))?,
            open_checksum: Some(self.open_checksum.ok_or_raise(|| ErrorKind::IncompleteIndexEntry("open-checksum"))?),
            location: self.location.ok_or_raise(|| ErrorKind::IncompleteIndexEntry("location"))?,
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
            size: self.gzip_size.ok_or_raise(|| ErrorKind::IncompleteIndexEntry("size"))?,
            open_size: Some(self.open_size.ok_or_raise(|| ErrorKind::IncompleteIndexEntry("open-size"))?),
        };
        tracing::debug!(data_type = %entry.data_type, location = %entry.location, "registered index entry");
        let database = format!("{}_db", self.data_type);
        self.index.entries.retain(|existing| existing.data_type != database);
        self.index.upsert(entry);
        Ok(())
    }
}

fn attribute(start: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    let attr = start.try_get_attribute(name).ok().flatten()?;
    attr.unescape_value().ok().map(Cow::into_owned)
}

fn text<W: std::io::Write>(xml: &mut Writer<W>, name: &str, attrs: &[(&str, &str)], value: &str) -> Result<()> {
    emit(xml, Event::Start(BytesStart::new(name).with_attributes(attrs.iter().copied())))?;
    emit(xml, Event::Text(BytesText::new(value)))?;
    emit(xml, Event::End(BytesEnd::new(name)))
}
