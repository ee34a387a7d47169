//! Compression formats for published repository metadata.
//!
//! Package managers fetch `repodata/*.xml.<ext>` and pick the decoder from
//! the extension recorded in `repomd.xml`. This crate wraps the encoders
//! behind a single [`Compression`] enum, providing:
//!
//! - **Format detection** from storage keys ([`Compression::from_path`])
//! - **In-memory** compression/decompression ([`Compression::compress`],
//!   [`Compression::decompress`])
//! - **Streaming** via [`Compression::wrap_reader`] and [`Encoder`], whose
//!   [`finish`](Encoder::finish) surfaces trailer write errors instead of
//!   swallowing them on drop.
//!
//! Gzip and Bzip2 are always available; XZ and Zstd are behind the `xz` and
//! `zstd` features.

mod construct;
mod encoder;
pub mod error;
mod ops;
mod util;

pub use crate::encoder::Encoder;

/// A supported compression format.
///
/// Defaults to [`Gzip`](Self::Gzip), the format every yum/dnf client
/// understands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    None,
    /// Bzip2 compression (.bz2)
    Bzip2,
    /// Gzip compression (.gz)
    #[default]
    Gzip,
    /// XZ/LZMA compression (.xz)
    #[cfg(feature = "xz")]
    Xz,
    /// Zstd compression (.zst)
    #[cfg(feature = "zstd")]
    Zstd,
}

#[cfg(test)]
mod tests {
    use crate::Compression;

    #[test]
    fn compression_default() {
        assert_eq!(Compression::default(), Compression::Gzip);
    }
}
