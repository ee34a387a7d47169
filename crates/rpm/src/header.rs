//! RPM lead, signature header and main header parsing.
//!
//! An archive starts with a fixed 96-byte lead, followed by the signature
//! header (padded to an 8-byte boundary), the main header, and finally the
//! compressed payload. Only the two headers are decoded; the payload is left
//! in the stream for the caller to digest.
//!
//! Both headers share one layout: a 16-byte intro (magic, 4 reserved bytes,
//! index entry count, data store size), then 16 bytes per index entry (tag,
//! type, offset, count), then the data store the entries point into.

use crate::error::{ErrorKind, Result};
use crate::record::HeaderRange;
use crate::tags::{Tag, TagTable};
use exn::{Exn, ResultExt};
use std::collections::HashMap;
use std::io::{ErrorKind as IoErrorKind, Read};

const LEAD_SIZE: u64 = 96;
const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
const HEADER_MAGIC: [u8; 4] = [0x8e, 0xad, 0xe8, 0x01];
const INTRO_SIZE: u64 = 16;
const INDEX_ENTRY_SIZE: u64 = 16;
// Same ceilings rpm itself enforces; anything larger is corrupt or hostile.
const MAX_INDEX_ENTRIES: u32 = 0xffff;
const MAX_DATA_SIZE: u32 = 0x0fff_ffff;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ValueType {
    Char,
    Int8,
    Int16,
    Int32,
    Int64,
    String,
    Bin,
    StringArray,
    I18nString,
}

impl ValueType {
    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Self::Char),
            2 => Some(Self::Int8),
            3 => Some(Self::Int16),
            4 => Some(Self::Int32),
            5 => Some(Self::Int64),
            6 => Some(Self::String),
            7 => Some(Self::Bin),
            8 => Some(Self::StringArray),
            9 => Some(Self::I18nString),
            _ => None,
        }
    }

    fn int_width(&self) -> Option<usize> {
        match self {
            Self::Char | Self::Int8 => Some(1),
            Self::Int16 => Some(2),
            Self::Int32 => Some(4),
            Self::Int64 => Some(8),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    kind: ValueType,
    offset: usize,
    count: usize,
}

/// One decoded header structure.
#[derive(Clone, Debug, Default)]
pub struct Header {
    index: HashMap<u32, IndexEntry>,
    store: Vec<u8>,
}

/// Both headers of an archive and where the main one sits in the file.
#[derive(Clone, Debug)]
pub struct RpmHeaders {
    pub signature: Header,
    pub main: Header,
    pub range: HeaderRange,
}

/// Parse the lead and both headers, leaving the reader positioned at the
/// start of the payload.
pub fn read_package<R: Read>(reader: &mut R) -> Result<RpmHeaders> {
    let mut lead = [0u8; LEAD_SIZE as usize];
    fill(reader, &mut lead, "truncated lead")?;
    if lead[..4] != LEAD_MAGIC {
        exn::bail!(ErrorKind::Malformed("not an RPM archive"));
    }
    let (signature, signature_len) = Header::read_from(reader)?;
    let padding = (8 - signature_len % 8) % 8;
    let mut pad = [0u8; 8];
    fill(reader, &mut pad[..padding as usize], "truncated signature padding")?;

    let start = LEAD_SIZE + signature_len + padding;
    let (main, main_len) = Header::read_from(reader)?;
    Ok(RpmHeaders {
        signature,
        main,
        range: HeaderRange { start, end: start + main_len },
    })
}

impl Header {
    /// Read one header structure, returning it with the number of bytes it
    /// occupied in the stream.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<(Self, u64)> {
        let mut intro = [0u8; INTRO_SIZE as usize];
        fill(reader, &mut intro, "truncated header intro")?;
        if intro[..4] != HEADER_MAGIC {
            exn::bail!(ErrorKind::Malformed("bad header magic"));
        }
        let entries = be32(&intro, 8);
        let data_size = be32(&intro, 12);
        if entries > MAX_INDEX_ENTRIES {
            exn::bail!(ErrorKind::Malformed("too many index entries"));
        }
        if data_size > MAX_DATA_SIZE {
            exn::bail!(ErrorKind::Malformed("header data store too large"));
        }

        let mut raw_index = vec![0u8; entries as usize * INDEX_ENTRY_SIZE as usize];
        fill(reader, &mut raw_index, "truncated header index")?;
        let mut store = vec![0u8; data_size as usize];
        fill(reader, &mut store, "truncated header data")?;

        let mut index = HashMap::with_capacity(entries as usize);
        for raw in raw_index.chunks_exact(INDEX_ENTRY_SIZE as usize) {
            let (tag, kind, offset, count) = (be32(raw, 0), be32(raw, 4), be32(raw, 8), be32(raw, 12));
            if offset > data_size {
                exn::bail!(ErrorKind::Malformed("index entry points outside the data store"));
            }
            // NULL and unknown types carry nothing readable.
            let Some(kind) = ValueType::from_raw(kind) else {
                continue;
            };
            index.insert(tag, IndexEntry { kind, offset: offset as usize, count: count as usize });
        }

        let length = INTRO_SIZE + INDEX_ENTRY_SIZE * u64::from(entries) + u64::from(data_size);
        Ok((Self { index, store }, length))
    }

    fn string_at(&self, offset: usize) -> Option<(String, usize)> {
        let tail = self.store.get(offset..)?;
        let end = tail.iter().position(|b| *b == 0)?;
        Some((String::from_utf8_lossy(&tail[..end]).into_owned(), offset + end + 1))
    }

    fn strings(&self, entry: &IndexEntry) -> Vec<String> {
        if !matches!(entry.kind, ValueType::String | ValueType::StringArray | ValueType::I18nString) {
            return Vec::new();
        }
        let count = match entry.kind {
            ValueType::String => 1,
            _ => entry.count,
        };
        let mut values = Vec::new();
        let mut offset = entry.offset;
        while values.len() < count {
            let Some((value, next)) = self.string_at(offset) else {
                break;
            };
            values.push(value);
            offset = next;
        }
        values
    }

    fn ints(&self, entry: &IndexEntry) -> Vec<u64> {
        let Some(width) = entry.kind.int_width() else {
            return Vec::new();
        };
        let Some(bytes) = entry
            .count
            .checked_mul(width)
            .and_then(|len| entry.offset.checked_add(len))
            .and_then(|end| self.store.get(entry.offset..end))
        else {
            return Vec::new();
        };
        bytes
            .chunks_exact(width)
            .map(|chunk| chunk.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
            .collect()
    }

    fn entry(&self, tag: Tag) -> Option<&IndexEntry> {
        self.index.get(&tag.id())
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl TagTable for Header {
    fn as_string(&self, tag: Tag, default: &str) -> String {
        self.entry(tag)
            .and_then(|entry| self.strings(entry).into_iter().next())
            .unwrap_or_else(|| default.to_string())
    }

    fn as_int(&self, tag: Tag, default: u64) -> u64 {
        self.entry(tag)
            .and_then(|entry| self.ints(entry).into_iter().next())
            .unwrap_or(default)
    }

    fn as_string_list(&self, tag: Tag) -> Vec<String> {
        self.entry(tag).map(|entry| self.strings(entry)).unwrap_or_default()
    }

    fn as_int_list(&self, tag: Tag) -> Vec<u64> {
        self.entry(tag).map(|entry| self.ints(entry)).unwrap_or_default()
    }

    fn contains(&self, tag: Tag) -> bool {
        self.entry(tag).is_some()
    }
}

fn be32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn fill<R: Read>(reader: &mut R, buf: &mut [u8], what: &'static str) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == IoErrorKind::UnexpectedEof => Err(Exn::from(ErrorKind::Malformed(what))),
        Err(err) => Err(err).or_raise(|| ErrorKind::Io),
    }
}

/// Byte-level builders for synthetic archives.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::{HEADER_MAGIC, LEAD_MAGIC, LEAD_SIZE};
    use crate::tags::Tag;

    #[derive(Default)]
    pub struct HeaderBuilder {
        entries: Vec<(u32, u32, Vec<u8>, u32)>,
    }

    impl HeaderBuilder {
        fn push(mut self, tag: Tag, kind: u32, data: Vec<u8>, count: usize) -> Self {
            self.entries.push((tag.id(), kind, data, count as u32));
            self
        }

        pub fn string(self, tag: Tag, value: &str) -> Self {
            self.push(tag, 6, nul_terminated(&[value]), 1)
        }

        pub fn i18n(self, tag: Tag, value: &str) -> Self {
            self.push(tag, 9, nul_terminated(&[value]), 1)
        }

        pub fn strings(self, tag: Tag, values: &[&str]) -> Self {
            self.push(tag, 8, nul_terminated(values), values.len())
        }

        pub fn int16s(self, tag: Tag, values: &[u16]) -> Self {
            let data = values.iter().flat_map(|v| v.to_be_bytes()).collect();
            self.push(tag, 3, data, values.len())
        }

        pub fn int32s(self, tag: Tag, values: &[u32]) -> Self {
            let data = values.iter().flat_map(|v| v.to_be_bytes()).collect();
            self.push(tag, 4, data, values.len())
        }

        pub fn build(&self) -> Vec<u8> {
            let mut index = Vec::new();
            let mut store: Vec<u8> = Vec::new();
            for (tag, kind, data, count) in &self.entries {
                index.extend(tag.to_be_bytes());
                index.extend(kind.to_be_bytes());
                index.extend((store.len() as u32).to_be_bytes());
                index.extend(count.to_be_bytes());
                store.extend(data);
            }
            let mut out = HEADER_MAGIC.to_vec();
            out.extend([0u8; 4]);
            out.extend((self.entries.len() as u32).to_be_bytes());
            out.extend((store.len() as u32).to_be_bytes());
            out.extend(index);
            out.extend(store);
            out
        }
    }

    fn nul_terminated(values: &[&str]) -> Vec<u8> {
        values.iter().flat_map(|v| v.bytes().chain([0])).collect()
    }

    /// Lead + padded signature + main header + payload.
    pub fn archive(signature: &HeaderBuilder, main: &HeaderBuilder, payload: &[u8]) -> Vec<u8> {
        let mut out = LEAD_MAGIC.to_vec();
        out.resize(LEAD_SIZE as usize, 0);
        let signature = signature.build();
        let padding = (8 - signature.len() % 8) % 8;
        out.extend(&signature);
        out.extend(vec![0u8; padding]);
        out.extend(main.build());
        out.extend(payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{HeaderBuilder, archive};
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    #[test]
    fn test_typed_accessors() {
        let bytes = HeaderBuilder::default()
            .string(Tag::Name, "hello")
            .i18n(Tag::Summary, "Say hello")
            .strings(Tag::BaseNames, &["a", "b", "c"])
            .int32s(Tag::DirIndexes, &[0, 0, 1])
            .int16s(Tag::FileModes, &[0o100644, 0o040755, 0o100755])
            .build();
        let (header, length) = Header::read_from(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(length, bytes.len() as u64);
        assert_eq!(header.as_string(Tag::Name, ""), "hello");
        assert_eq!(header.as_string(Tag::Summary, ""), "Say hello");
        assert_eq!(header.as_string_list(Tag::BaseNames), vec!["a", "b", "c"]);
        assert_eq!(header.as_int_list(Tag::DirIndexes), vec![0, 0, 1]);
        assert_eq!(header.as_int_list(Tag::FileModes), vec![0o100644, 0o040755, 0o100755]);
        // Missing tags and mismatched types fall back to defaults.
        assert_eq!(header.as_string(Tag::Vendor, "none"), "none");
        assert_eq!(header.as_int(Tag::Name, 7), 7);
        assert!(header.as_int_list(Tag::BaseNames).is_empty());
        assert!(header.contains(Tag::Name));
        assert!(!header.contains(Tag::Vendor));
    }

    #[test]
    fn test_read_package_computes_header_range() {
        let signature = HeaderBuilder::default().int32s(Tag::PayloadSize, &[1234]);
        let main = HeaderBuilder::default().string(Tag::Name, "hello").string(Tag::Arch, "noarch");
        let bytes = archive(&signature, &main, b"payload");
        let mut cursor = Cursor::new(&bytes);
        let headers = read_package(&mut cursor).unwrap();

        let signature_len = signature.build().len() as u64;
        let padded = signature_len + (8 - signature_len % 8) % 8;
        assert_eq!(headers.range.start, 96 + padded);
        assert_eq!(headers.range.end, headers.range.start + main.build().len() as u64);
        assert_eq!(cursor.position(), headers.range.end);
        assert_eq!(headers.signature.as_int(Tag::PayloadSize, 0), 1234);
        assert_eq!(headers.main.as_string(Tag::Arch, ""), "noarch");
    }

    #[rstest]
    #[case(b"not an rpm at all, definitely not".to_vec())]
    #[case(vec![0xed, 0xab, 0xee, 0xdb])]
    #[case(Vec::new())]
    fn test_read_package_rejects_garbage(#[case] bytes: Vec<u8>) {
        let err = read_package(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(*err, ErrorKind::Malformed(_)));
    }

    #[test]
    fn test_bad_header_magic() {
        let mut bytes = HeaderBuilder::default().string(Tag::Name, "x").build();
        bytes[0] = 0;
        let err = Header::read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert_eq!(*err, ErrorKind::Malformed("bad header magic"));
    }

    #[test]
    fn test_out_of_range_entry_is_rejected() {
        let mut bytes = HeaderBuilder::default().string(Tag::Name, "x").build();
        // First index entry's offset field.
        bytes[16 + 8..16 + 12].copy_from_slice(&1000u32.to_be_bytes());
        let err = Header::read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert!(matches!(*err, ErrorKind::Malformed(_)));
    }
}
