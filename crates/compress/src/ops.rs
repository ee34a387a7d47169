//! Compression Operations

use crate::error::{ErrorKind, Result};
use crate::{Compression, Encoder};
use bzip2::{Compression as BzCompression, read::MultiBzDecoder};
use exn::ResultExt;
use flate2::{Compression as GzCompression, read::MultiGzDecoder};
use std::io::{Read, Write};
use tracing::instrument;
#[cfg(feature = "xz")]
use xz2::read::XzDecoder;
#[cfg(feature = "zstd")]
use zstd::stream::read::Decoder as ZstdDecoder;

pub(crate) const BZIP2_LEVEL: BzCompression = BzCompression::best();
// Metadata is regenerated on every update run, so gzip stays at the default
// level rather than the slowest one.
pub(crate) const GZIP_LEVEL: GzCompression = GzCompression::new(6);
#[cfg(feature = "xz")]
pub(crate) const XZ_LEVEL: u32 = 6;
#[cfg(feature = "zstd")]
pub(crate) const ZSTD_LEVEL: i32 = 19;

impl Compression {
    /// Compress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use repodata_compress::Compression;
    ///
    /// let xml = b"<repomd/>";
    /// let compressed = Compression::Gzip.compress(xml).unwrap();
    /// assert_eq!(Compression::Gzip.decompress(&compressed).unwrap(), xml);
    /// ```
    #[instrument(skip(input), fields(format = %self, input_size = input.len()))]
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = self.encoder(Vec::new())?;
        encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
        encoder.finish()
    }

    /// Decompress a byte slice in memory.
    #[instrument(skip(input), fields(format = %self, input_size = input.len()))]
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.wrap_reader(input)?.read_to_end(&mut output).or_raise(|| ErrorKind::InvalidData)?;
        Ok(output)
    }

    /// Wrap a reader with the matching decompression layer.
    ///
    /// Multi-member gzip and bzip2 streams are read to the end, as produced by
    /// some repository tools that append members.
    pub fn wrap_reader<'a, R: Read + 'a>(&self, reader: R) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Compression::None => Box::new(reader),
            Compression::Bzip2 => Box::new(MultiBzDecoder::new(reader)),
            Compression::Gzip => Box::new(MultiGzDecoder::new(reader)),
            #[cfg(feature = "xz")]
            Compression::Xz => Box::new(XzDecoder::new_multi_decoder(reader)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Box::new(ZstdDecoder::new(reader).or_raise(|| ErrorKind::Encoder)?),
        })
    }

    /// Wrap a writer with the matching compression layer.
    pub fn encoder<W: Write>(&self, writer: W) -> Result<Encoder<W>> {
        Encoder::new(*self, writer)
    }

    /// Decompress from a reader to a writer without buffering the whole
    /// input, returning the decompressed byte count.
    pub fn decompress_stream<'a, R: Read + 'a, W: Write>(&self, reader: R, mut writer: W) -> Result<u64> {
        let mut reader = self.wrap_reader(reader)?;
        std::io::copy(&mut reader, &mut writer).or_raise(|| ErrorKind::InvalidData)
    }
}
