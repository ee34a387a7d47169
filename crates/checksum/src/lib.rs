//! Checksum Service.
//!
//! Computes a named digest over bytes or a stream and renders it as lowercase
//! hex, the form package managers compare against `<checksum>` elements. The
//! algorithm set is closed: anything outside [`Algorithm`] is rejected with
//! [`UnsupportedDigest`](error::ErrorKind::UnsupportedDigest) when parsed,
//! which in practice means at configuration load.

pub mod error;
mod hasher;
mod io;

pub use crate::hasher::Hasher;
pub use crate::io::{HashingReader, HashingWriter};

use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::Read;
use std::str::FromStr;

/// Digest algorithms understood by yum/dnf clients.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Sha1,
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    /// Name written into the `type` attribute of `<checksum>` elements.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha1 => "sha1",
            Algorithm::Sha224 => "sha224",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
        }
    }

    /// Length of the hex rendering of this digest.
    #[must_use]
    pub fn hex_len(&self) -> usize {
        match self {
            Algorithm::Sha1 => 40,
            Algorithm::Sha224 => 56,
            Algorithm::Sha256 => 64,
            Algorithm::Sha384 => 96,
            Algorithm::Sha512 => 128,
        }
    }

    pub fn hasher(&self) -> Hasher {
        Hasher::new(*self)
    }

    /// Digest an in-memory buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use repodata_checksum::Algorithm;
    ///
    /// assert_eq!(
    ///     Algorithm::Sha256.digest(b""),
    ///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
    /// );
    /// ```
    #[must_use]
    pub fn digest(&self, bytes: impl AsRef<[u8]>) -> String {
        let mut hasher = self.hasher();
        hasher.update(bytes.as_ref());
        hasher.finalize()
    }

    /// Digest a stream, consuming it to the end.
    pub fn digest_reader<R: Read>(&self, reader: R) -> Result<Checksum> {
        let mut reader = HashingReader::new(reader, *self);
        std::io::copy(&mut reader, &mut std::io::sink()).or_raise(|| ErrorKind::Io)?;
        Ok(reader.finish().1)
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "").as_str() {
            // Older createrepo versions write plain "sha" for SHA-1.
            "sha" | "sha1" => Ok(Algorithm::Sha1),
            "sha224" => Ok(Algorithm::Sha224),
            "sha256" => Ok(Algorithm::Sha256),
            "sha384" => Ok(Algorithm::Sha384),
            "sha512" => Ok(Algorithm::Sha512),
            _ => exn::bail!(ErrorKind::UnsupportedDigest(s.to_string())),
        }
    }
}

/// The digest of a byte stream along with how many bytes went into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: Algorithm,
    pub hex: String,
    pub size: u64,
}
