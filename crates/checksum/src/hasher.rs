use crate::Algorithm;
use sha2::Digest as _;

enum Inner {
    Sha1(sha1::Sha1),
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

/// Incremental hasher for any [`Algorithm`].
pub struct Hasher {
    inner: Inner,
}

impl Hasher {
    pub fn new(algorithm: Algorithm) -> Self {
        let inner = match algorithm {
            Algorithm::Sha1 => Inner::Sha1(sha1::Sha1::new()),
            Algorithm::Sha224 => Inner::Sha224(sha2::Sha224::new()),
            Algorithm::Sha256 => Inner::Sha256(sha2::Sha256::new()),
            Algorithm::Sha384 => Inner::Sha384(sha2::Sha384::new()),
            Algorithm::Sha512 => Inner::Sha512(sha2::Sha512::new()),
        };
        Self { inner }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self.inner {
            Inner::Sha1(_) => Algorithm::Sha1,
            Inner::Sha224(_) => Algorithm::Sha224,
            Inner::Sha256(_) => Algorithm::Sha256,
            Inner::Sha384(_) => Algorithm::Sha384,
            Inner::Sha512(_) => Algorithm::Sha512,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        match &mut self.inner {
            Inner::Sha1(h) => h.update(bytes),
            Inner::Sha224(h) => h.update(bytes),
            Inner::Sha256(h) => h.update(bytes),
            Inner::Sha384(h) => h.update(bytes),
            Inner::Sha512(h) => h.update(bytes),
        }
    }

    /// Lowercase hex rendering of the digest.
    pub fn finalize(self) -> String {
        match self.inner {
            Inner::Sha1(h) => format!("{:x}", h.finalize()),
            Inner::Sha224(h) => format!("{:x}", h.finalize()),
            Inner::Sha256(h) => format!("{:x}", h.finalize()),
            Inner::Sha384(h) => format!("{:x}", h.finalize()),
            Inner::Sha512(h) => format!("{:x}", h.finalize()),
        }
    }
}
