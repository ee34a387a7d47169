//! Finishable streaming encoder.

use crate::Compression;
use crate::error::{ErrorKind, Result};
use bzip2::write::BzEncoder;
use exn::ResultExt;
use flate2::write::GzEncoder;
use std::io::{Result as IoResult, Write};
#[cfg(feature = "xz")]
use xz2::write::XzEncoder;
#[cfg(feature = "zstd")]
use zstd::stream::write::Encoder as ZstdEncoder;

/// A compressing [`Write`]r for one [`Compression`] format.
///
/// Boxed `dyn Write` encoders finish themselves on drop and discard any error
/// writing the trailer. A published document whose trailer failed to write
/// would still get a checksum registered in `repomd.xml`, so callers must
/// [`finish`](Self::finish) explicitly and propagate the result.
pub enum Encoder<W: Write> {
    None(W),
    Bzip2(BzEncoder<W>),
    Gzip(GzEncoder<W>),
    #[cfg(feature = "xz")]
    Xz(XzEncoder<W>),
    #[cfg(feature = "zstd")]
    Zstd(ZstdEncoder<'static, W>),
}

impl<W: Write> Encoder<W> {
    pub(crate) fn new(format: Compression, writer: W) -> Result<Self> {
        Ok(match format {
            Compression::None => Self::None(writer),
            Compression::Bzip2 => Self::Bzip2(BzEncoder::new(writer, crate::ops::BZIP2_LEVEL)),
            Compression::Gzip => Self::Gzip(GzEncoder::new(writer, crate::ops::GZIP_LEVEL)),
            #[cfg(feature = "xz")]
            Compression::Xz => Self::Xz(XzEncoder::new(writer, crate::ops::XZ_LEVEL)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => {
                Self::Zstd(ZstdEncoder::new(writer, crate::ops::ZSTD_LEVEL).or_raise(|| ErrorKind::Encoder)?)
            },
        })
    }

    /// Write the format trailer and hand back the inner writer.
    pub fn finish(self) -> Result<W> {
        let mut inner = match self {
            Self::None(w) => w,
            Self::Bzip2(e) => e.finish().or_raise(|| ErrorKind::Io)?,
            Self::Gzip(e) => e.finish().or_raise(|| ErrorKind::Io)?,
            #[cfg(feature = "xz")]
            Self::Xz(e) => e.finish().or_raise(|| ErrorKind::Io)?,
            #[cfg(feature = "zstd")]
            Self::Zstd(e) => e.finish().or_raise(|| ErrorKind::Io)?,
        };
        inner.flush().or_raise(|| ErrorKind::Io)?;
        Ok(inner)
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        match self {
            Self::None(w) => w.write(buf),
            Self::Bzip2(e) => e.write(buf),
            Self::Gzip(e) => e.write(buf),
            #[cfg(feature = "xz")]
            Self::Xz(e) => e.write(buf),
            #[cfg(feature = "zstd")]
            Self::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> IoResult<()> {
        match self {
            Self::None(w) => w.flush(),
            Self::Bzip2(e) => e.flush(),
            Self::Gzip(e) => e.flush(),
            #[cfg(feature = "xz")]
            Self::Xz(e) => e.flush(),
            #[cfg(feature = "zstd")]
            Self::Zstd(e) => e.flush(),
        }
    }
}
