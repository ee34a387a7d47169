use crate::tags::{Tag, TagTable};
use repodata_checksum::Checksum;
use std::fmt::{Display, Formatter, Result as FmtResult};

const FILE_TYPE_MASK: u64 = 0o170000;
const FILE_TYPE_DIR: u64 = 0o040000;
const FILE_FLAG_GHOST: u64 = 1 << 6;

/// Epoch, version and release of a package or dependency.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Evr {
    pub epoch: u64,
    pub version: String,
    /// Empty when a dependency constrains the version only.
    pub release: String,
}

impl Evr {
    /// Parse the `[epoch:]version[-release]` form used in dependency versions.
    pub fn parse(value: &str) -> Self {
        let (epoch, rest) = match value.split_once(':') {
            Some((epoch, rest)) if epoch.chars().all(|c| c.is_ascii_digit()) => (epoch.parse().unwrap_or(0), rest),
            _ => (0, value),
        };
        let (version, release) = rest.rsplit_once('-').unwrap_or((rest, ""));
        Self {
            epoch,
            version: version.to_string(),
            release: release.to_string(),
        }
    }
}

impl Display for Evr {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        f.write_str(&self.version)?;
        if !self.release.is_empty() {
            write!(f, "-{}", self.release)?;
        }
        Ok(())
    }
}

/// `RPMSENSE_*` bits of a dependency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DependencyFlags(pub u64);

impl DependencyFlags {
    const LESS: u64 = 0x02;
    const GREATER: u64 = 0x04;
    const EQUAL: u64 = 0x08;
    const PREREQ: u64 = 0x40;
    const SCRIPT_PRE: u64 = 0x200;
    const SCRIPT_POST: u64 = 0x400;

    /// Comparison operator as written in the `flags` attribute.
    pub fn comparison(&self) -> Option<&'static str> {
        match self.0 & (Self::LESS | Self::GREATER | Self::EQUAL) {
            Self::EQUAL => Some("EQ"),
            Self::LESS => Some("LT"),
            Self::GREATER => Some("GT"),
            x if x == Self::LESS | Self::EQUAL => Some("LE"),
            x if x == Self::GREATER | Self::EQUAL => Some("GE"),
            _ => None,
        }
    }

    /// Needed before the package's own scriptlets run.
    pub fn is_pre(&self) -> bool {
        self.0 & (Self::PREREQ | Self::SCRIPT_PRE | Self::SCRIPT_POST) != 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub flags: DependencyFlags,
    pub evr: Option<Evr>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub author: String,
    pub date: u64,
    pub text: String,
}

/// Byte offsets of the main header within the archive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeaderRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Ghost,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageFile {
    pub path: String,
    pub kind: FileKind,
}

/// What is known about an archive without looking inside its header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFacts {
    /// Key relative to the repository root, e.g. `Packages/a-1.0-1.x86_64.rpm`.
    pub location: String,
    /// Digest and byte length of the whole archive.
    pub checksum: Checksum,
    /// Modification time of the archive, seconds since the epoch.
    pub file_time: u64,
}

/// Everything the metadata writers need to know about one package.
///
/// Immutable once built; the same record is handed to all three writers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub arch: String,
    pub evr: Evr,
    pub summary: String,
    pub description: String,
    pub packager: String,
    pub url: String,
    pub build_time: u64,
    pub file_time: u64,
    pub installed_size: u64,
    pub archive_size: u64,
    pub license: String,
    pub vendor: String,
    pub group: String,
    pub build_host: String,
    pub source_rpm: String,
    pub provides: Vec<Dependency>,
    pub requires: Vec<Dependency>,
    pub base_names: Vec<String>,
    pub dir_names: Vec<String>,
    pub dir_indexes: Vec<u64>,
    pub file_modes: Vec<u64>,
    pub file_flags: Vec<u64>,
    /// Oldest entry first.
    pub changelog: Vec<ChangelogEntry>,
    pub header_range: HeaderRange,
    pub checksum: Checksum,
    pub location: String,
}

impl PackageRecord {
    /// Map header tags onto a record.
    ///
    /// Source packages carry no `SOURCERPM` tag; their arch is reported as
    /// `src` whatever the header says, which is what clients expect.
    pub fn from_tags(main: &dyn TagTable, signature: &dyn TagTable, range: HeaderRange, facts: SourceFacts) -> Self {
        let source_rpm = main.as_string(Tag::SourceRpm, "");
        let arch = match source_rpm.is_empty() {
            true => "src".to_string(),
            false => main.as_string(Tag::Arch, ""),
        };
        let installed_size = match main.contains(Tag::LongSize) {
            true => main.as_int(Tag::LongSize, 0),
            false => main.as_int(Tag::Size, 0),
        };
        let archive_size = match main.contains(Tag::ArchiveSize) {
            true => main.as_int(Tag::ArchiveSize, 0),
            false if signature.contains(Tag::LongArchiveSize) => signature.as_int(Tag::LongArchiveSize, 0),
            false => signature.as_int(Tag::PayloadSize, 0),
        };

        let provides = dependencies(main, Tag::ProvideName, Tag::ProvideFlags, Tag::ProvideVersion);
        let requires = dependencies(main, Tag::RequireName, Tag::RequireFlags, Tag::RequireVersion)
            .into_iter()
            // Capabilities of rpm itself; every client provides them implicitly.
            .filter(|dep| !dep.name.starts_with("rpmlib("))
            .collect();

        let mut changelog: Vec<_> = main
            .as_string_list(Tag::ChangelogName)
            .into_iter()
            .zip(main.as_int_list(Tag::ChangelogTime))
            .zip(main.as_string_list(Tag::ChangelogText))
            .map(|((author, date), text)| ChangelogEntry { author, date, text })
            .collect();
        changelog.reverse();

        Self {
            name: main.as_string(Tag::Name, ""),
            arch,
            evr: Evr {
                epoch: main.as_int(Tag::Epoch, 0),
                version: main.as_string(Tag::Version, ""),
                release: main.as_string(Tag::Release, ""),
            },
            summary: main.as_string(Tag::Summary, ""),
            description: main.as_string(Tag::Description, ""),
            packager: main.as_string(Tag::Packager, ""),
            url: main.as_string(Tag::Url, ""),
            build_time: main.as_int(Tag::BuildTime, 0),
            file_time: facts.file_time,
            installed_size,
            archive_size,
            license: main.as_string(Tag::License, ""),
            vendor: main.as_string(Tag::Vendor, ""),
            group: main.as_string(Tag::Group, ""),
            build_host: main.as_string(Tag::BuildHost, ""),
            source_rpm,
            provides,
            requires,
            base_names: main.as_string_list(Tag::BaseNames),
            dir_names: main.as_string_list(Tag::DirNames),
            dir_indexes: main.as_int_list(Tag::DirIndexes),
            file_modes: main.as_int_list(Tag::FileModes),
            file_flags: main.as_int_list(Tag::FileFlags),
            changelog,
            header_range: range,
            checksum: facts.checksum,
            location: facts.location,
        }
    }

    /// Package identifier: the hex digest of the whole archive.
    pub fn pkgid(&self) -> &str {
        &self.checksum.hex
    }

    /// Size of the archive in bytes.
    pub fn size(&self) -> u64 {
        self.checksum.size
    }

    /// Every file the package installs, with directories and ghosts marked.
    pub fn files(&self) -> impl Iterator<Item = PackageFile> + '_ {
        self.base_names.iter().enumerate().filter_map(|(i, base)| {
            let index = usize::try_from(*self.dir_indexes.get(i)?).ok()?;
            let dir = self.dir_names.get(index)?;
            let mode = self.file_modes.get(i).copied().unwrap_or(0);
            let flags = self.file_flags.get(i).copied().unwrap_or(0);
            let kind = if flags & FILE_FLAG_GHOST != 0 {
                FileKind::Ghost
            } else if mode & FILE_TYPE_MASK == FILE_TYPE_DIR {
                FileKind::Dir
            } else {
                FileKind::File
            };
            Some(PackageFile { path: format!("{dir}{base}"), kind })
        })
    }
}

fn dependencies(table: &dyn TagTable, names: Tag, flags: Tag, versions: Tag) -> Vec<Dependency> {
    let flags = table.as_int_list(flags);
    let versions = table.as_string_list(versions);
    table
        .as_string_list(names)
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let version = versions.get(i).map(String::as_str).unwrap_or("");
            Dependency {
                name,
                flags: DependencyFlags(flags.get(i).copied().unwrap_or(0)),
                evr: (!version.is_empty()).then(|| Evr::parse(version)),
            }
        })
        .collect()
}
