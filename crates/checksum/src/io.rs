//! Pass-through readers and writers that digest and count every byte.
//!
//! `repomd.xml` needs both the checksum and the size of each document twice
//! over (compressed and uncompressed), so the publishing path stacks a
//! [`HashingWriter`] on either side of the encoder instead of re-reading the
//! files afterwards.

use crate::{Algorithm, Checksum, Hasher};
use std::io::{Read, Result as IoResult, Write};

pub struct HashingWriter<W> {
    inner: W,
    hasher: Hasher,
    size: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W, algorithm: Algorithm) -> Self {
        Self { inner, hasher: algorithm.hasher(), size: 0 }
    }

    /// Bytes accepted by the inner writer so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn finish(self) -> (W, Checksum) {
        let algorithm = self.hasher.algorithm();
        let checksum = Checksum { algorithm, hex: self.hasher.finalize(), size: self.size };
        (self.inner, checksum)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        let written = self.inner.write(buf)?;
        // Only digest what the inner writer accepted; `write_all` retries the rest.
        self.hasher.update(&buf[..written]);
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner.flush()
    }
}

pub struct HashingReader<R> {
    inner: R,
    hasher: Hasher,
    size: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, algorithm: Algorithm) -> Self {
        Self { inner, hasher: algorithm.hasher(), size: 0 }
    }

    pub fn finish(self) -> (R, Checksum) {
        let algorithm = self.hasher.algorithm();
        let checksum = Checksum { algorithm, hex: self.hasher.finalize(), size: self.size };
        (self.inner, checksum)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let read = self.inner.read(buf)?;
        self.hasher.update(&buf[..read]);
        self.size += read as u64;
        Ok(read)
    }
}
