use crate::Compression;
use crate::error::{Error, ErrorKind};
use std::{path::Path, str::FromStr};

impl FromStr for Compression {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "bz2" | "bzip2" => Ok(Compression::Bzip2),
            "gz" | "gzip" => Ok(Compression::Gzip),
            #[cfg(feature = "xz")]
            "xz" | "lzma" => Ok(Compression::Xz),
            #[cfg(not(feature = "xz"))]
            "xz" | "lzma" => exn::bail!(ErrorKind::DisabledFormat(s.to_string())),
            #[cfg(feature = "zstd")]
            "zst" | "zstd" => Ok(Compression::Zstd),
            #[cfg(not(feature = "zstd"))]
            "zst" | "zstd" => exn::bail!(ErrorKind::DisabledFormat(s.to_string())),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
        }
    }
}

impl Compression {
    /// Detect compression from the final extension of a storage key, so
    /// `repodata/primary.xml.gz` is [`Gzip`](Self::Gzip) and
    /// `repodata/repomd.xml` is [`None`](Self::None).
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| match ext.to_lowercase().as_str() {
                "bz2" => Compression::Bzip2,
                "gz" => Compression::Gzip,
                #[cfg(feature = "xz")]
                "xz" => Compression::Xz,
                #[cfg(feature = "zstd")]
                "zst" => Compression::Zstd,
                _ => Compression::None,
            })
            .unwrap_or(Compression::None)
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use rstest::rstest;

    #[rstest]
    #[case("none", Compression::None)]
    #[case("bz2", Compression::Bzip2)]
    #[case("BZIP2", Compression::Bzip2)]
    #[case("gz", Compression::Gzip)]
    #[case(".gz", Compression::Gzip)]
    #[case("gzip", Compression::Gzip)]
    #[cfg_attr(feature = "xz", case("xz", Compression::Xz))]
    #[cfg_attr(feature = "zstd", case("zstd", Compression::Zstd))]
    fn test_from_str(#[case] test: &str, #[case] expected: Compression) {
        assert_eq!(test.parse::<Compression>().unwrap(), expected);
    }

    #[rstest]
    #[case("rar")]
    #[case("definitely not valid")]
    #[case(" ")]
    fn test_from_str_invalid(#[case] test: &str) {
        assert!(test.parse::<Compression>().is_err());
    }

    #[rstest]
    #[case("repodata/repomd.xml", Compression::None)]
    #[case("repodata/primary.xml.gz", Compression::Gzip)]
    #[case("repodata/0a1b2c-filelists.xml.GZ", Compression::Gzip)]
    #[case("repodata/other.xml.bz2", Compression::Bzip2)]
    // A dotfile has no extension, and therefore no compression.
    #[case(".gz", Compression::None)]
    #[cfg_attr(feature = "xz", case("repodata/primary.xml.xz", Compression::Xz))]
    #[cfg_attr(feature = "zstd", case("repodata/primary.xml.zst", Compression::Zstd))]
    fn test_from_path(#[case] test: &str, #[case] expected: Compression) {
        assert_eq!(Compression::from_path(test), expected);
    }
}
