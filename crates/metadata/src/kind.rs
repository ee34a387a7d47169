use std::fmt::{Display, Formatter, Result as FmtResult};

pub(crate) const COMMON_NS: &str = "http://linux.duke.edu/metadata/common";
pub(crate) const RPM_NS: &str = "http://linux.duke.edu/metadata/rpm";
pub(crate) const FILELISTS_NS: &str = "http://linux.duke.edu/metadata/filelists";
pub(crate) const OTHER_NS: &str = "http://linux.duke.edu/metadata/other";
pub(crate) const REPO_NS: &str = "http://linux.duke.edu/metadata/repo";

/// The three package-description documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetadataKind {
    Primary,
    Filelists,
    Other,
}

impl MetadataKind {
    pub const ALL: [MetadataKind; 3] = [MetadataKind::Primary, MetadataKind::Filelists, MetadataKind::Other];

    /// Lowercase type name, used as the `type` of the repomd entry and in
    /// published filenames.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            MetadataKind::Primary => "primary",
            MetadataKind::Filelists => "filelists",
            MetadataKind::Other => "other",
        }
    }

    pub(crate) fn root_tag(&self) -> &'static str {
        match self {
            MetadataKind::Primary => "metadata",
            MetadataKind::Filelists => "filelists",
            MetadataKind::Other => "otherdata",
        }
    }

    pub(crate) fn namespaces(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            MetadataKind::Primary => &[("xmlns", COMMON_NS), ("xmlns:rpm", RPM_NS)],
            MetadataKind::Filelists => &[("xmlns", FILELISTS_NS)],
            MetadataKind::Other => &[("xmlns", OTHER_NS)],
        }
    }

    /// Uncompressed filename, e.g. `primary.xml`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.xml", self.name())
    }
}

impl Display for MetadataKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}
