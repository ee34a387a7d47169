//! Named header tags and the typed-accessor view over a header index.
//!
//! Nothing outside this crate ever sees a numeric tag id. Record building goes
//! through [`TagTable`], which answers "give me this tag as a string/int/list,
//! or this default" and hides how the header stored it.

/// Header tags read when building a [`PackageRecord`](crate::PackageRecord).
///
/// Signature header tags share the numeric space with main header tags, so
/// [`Tag::PayloadSize`] and [`Tag::LongArchiveSize`] are only meaningful when
/// looked up in the signature header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    Name,
    Version,
    Release,
    Epoch,
    Summary,
    Description,
    BuildTime,
    BuildHost,
    Size,
    Vendor,
    License,
    Packager,
    Group,
    Url,
    Arch,
    FileModes,
    FileFlags,
    SourceRpm,
    ArchiveSize,
    ProvideName,
    RequireFlags,
    RequireName,
    RequireVersion,
    ChangelogTime,
    ChangelogName,
    ChangelogText,
    ProvideFlags,
    ProvideVersion,
    DirIndexes,
    BaseNames,
    DirNames,
    LongSize,
    PayloadSize,
    LongArchiveSize,
}

impl Tag {
    pub fn id(&self) -> u32 {
        match self {
            Tag::Name => 1000,
            Tag::Version => 1001,
            Tag::Release => 1002,
            Tag::Epoch => 1003,
            Tag::Summary => 1004,
            Tag::Description => 1005,
            Tag::BuildTime => 1006,
            Tag::BuildHost => 1007,
            Tag::Size => 1009,
            Tag::Vendor => 1011,
            Tag::License => 1014,
            Tag::Packager => 1015,
            Tag::Group => 1016,
            Tag::Url => 1020,
            Tag::Arch => 1022,
            Tag::FileModes => 1030,
            Tag::FileFlags => 1037,
            Tag::SourceRpm => 1044,
            Tag::ArchiveSize => 1046,
            Tag::ProvideName => 1047,
            Tag::RequireFlags => 1048,
            Tag::RequireName => 1049,
            Tag::RequireVersion => 1050,
            Tag::ChangelogTime => 1080,
            Tag::ChangelogName => 1081,
            Tag::ChangelogText => 1082,
            Tag::ProvideFlags => 1112,
            Tag::ProvideVersion => 1113,
            Tag::DirIndexes => 1116,
            Tag::BaseNames => 1117,
            Tag::DirNames => 1118,
            Tag::LongSize => 5009,
            // Signature header.
            Tag::PayloadSize => 1007,
            Tag::LongArchiveSize => 271,
        }
    }
}

/// Typed read access to a parsed header.
///
/// Lookups never fail: a missing tag, or one stored with a type that cannot be
/// read as requested, yields the default (or an empty list). Integer types of
/// every width widen to `u64`.
pub trait TagTable {
    fn as_string(&self, tag: Tag, default: &str) -> String;
    fn as_int(&self, tag: Tag, default: u64) -> u64;
    fn as_string_list(&self, tag: Tag) -> Vec<String>;
    fn as_int_list(&self, tag: Tag) -> Vec<u64>;

    fn contains(&self, tag: Tag) -> bool {
        !self.as_string_list(tag).is_empty() || !self.as_int_list(tag).is_empty()
    }
}

/// An empty table; every lookup answers with its default.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyTable;

impl TagTable for EmptyTable {
    fn as_string(&self, _tag: Tag, default: &str) -> String {
        default.to_string()
    }

    fn as_int(&self, _tag: Tag, default: u64) -> u64 {
        default
    }

    fn as_string_list(&self, _tag: Tag) -> Vec<String> {
        Vec::new()
    }

    fn as_int_list(&self, _tag: Tag) -> Vec<u64> {
        Vec::new()
    }
}
