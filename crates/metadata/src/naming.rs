use crate::error::{Error, ErrorKind};
use crate::{MetadataKind, REPODATA_DIR};
use repodata_compress::Compression;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;

/// How published documents are named.
///
/// Chosen once per repository and applied to every document type in a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Naming {
    /// `primary.xml.gz`: a fixed URL that always serves the latest copy.
    Plain,
    /// `<hex>-primary.xml.gz`, the hex digest being over the compressed
    /// bytes. Every version gets its own URL and can be cached forever.
    #[default]
    ChecksumPrefixed,
}

impl Naming {
    /// # Examples
    ///
    /// ```
    /// use repodata_compress::Compression;
    /// use repodata_metadata::{MetadataKind, Naming};
    ///
    /// assert_eq!(Naming::Plain.file_name(MetadataKind::Other, "abc", Compression::Gzip), "other.xml.gz");
    /// assert_eq!(
    ///     Naming::ChecksumPrefixed.file_name(MetadataKind::Other, "abc", Compression::Gzip),
    ///     "abc-other.xml.gz",
    /// );
    /// ```
    #[must_use]
    pub fn file_name(&self, kind: MetadataKind, checksum: &str, compression: Compression) -> String {
        match self {
            Naming::Plain => format!("{}{}", kind.file_name(), compression.extension()),
            Naming::ChecksumPrefixed => format!("{checksum}-{}{}", kind.file_name(), compression.extension()),
        }
    }

    /// Storage key of the published document.
    #[must_use]
    pub fn published_key(&self, kind: MetadataKind, checksum: &str, compression: Compression) -> PathBuf {
        PathBuf::from(REPODATA_DIR).join(self.file_name(kind, checksum, compression))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Naming::Plain => "plain",
            Naming::ChecksumPrefixed => "checksum",
        }
    }
}

impl Display for Naming {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Naming {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "simple" => Ok(Naming::Plain),
            "checksum" | "checksum-prefixed" | "unique" => Ok(Naming::ChecksumPrefixed),
            _ => exn::bail!(ErrorKind::UnsupportedNaming(s.to_string())),
        }
    }
}
