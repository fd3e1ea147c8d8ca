//! Content digests
//!
//! One algorithm is chosen per file by [`select_algorithm`] and used for both
//! the copy-time and the verify-time digest of that file.

use sha2::Digest as _;
use std::fmt;
use std::io::{self, Read};
use vericp_types::{DigestAlgorithm, DigestPreference};

/// Resolve a configured preference to an algorithm that is compiled in
pub fn select_algorithm(preference: DigestPreference) -> DigestAlgorithm {
    match preference {
        DigestPreference::Sha256 => DigestAlgorithm::Sha256,
        DigestPreference::Auto | DigestPreference::Blake3 => {
            if cfg!(feature = "blake3") {
                DigestAlgorithm::Blake3
            } else {
                DigestAlgorithm::Sha256
            }
        }
    }
}

/// A finished 256-bit content digest
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ContentDigest {
    algorithm: DigestAlgorithm,
    bytes: [u8; 32],
}

impl ContentDigest {
    /// Algorithm that produced this digest
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.bytes {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self)
    }
}

/// Running digest over a byte stream
#[derive(Clone)]
pub enum ContentHasher {
    /// BLAKE3
    #[cfg(feature = "blake3")]
    Blake3(Box<blake3::Hasher>),
    /// SHA-256
    Sha256(sha2::Sha256),
}

impl ContentHasher {
    /// Start a digest with `algorithm`.
    ///
    /// Without the `blake3` feature a BLAKE3 request is served by SHA-256;
    /// [`ContentHasher::algorithm`] reports what is actually used.
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            #[cfg(feature = "blake3")]
            DigestAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            #[cfg(not(feature = "blake3"))]
            DigestAlgorithm::Blake3 => Self::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
        }
    }

    /// Algorithm in use
    pub fn algorithm(&self) -> DigestAlgorithm {
        match self {
            #[cfg(feature = "blake3")]
            Self::Blake3(_) => DigestAlgorithm::Blake3,
            Self::Sha256(_) => DigestAlgorithm::Sha256,
        }
    }

    /// Feed bytes
    pub fn update(&mut self, data: &[u8]) {
        match self {
            #[cfg(feature = "blake3")]
            Self::Blake3(hasher) => {
                hasher.update(data);
            }
            Self::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Finish and return the digest
    pub fn finalize(self) -> ContentDigest {
        let algorithm = self.algorithm();
        let bytes = match self {
            #[cfg(feature = "blake3")]
            Self::Blake3(hasher) => *hasher.finalize().as_bytes(),
            Self::Sha256(hasher) => hasher.finalize().into(),
        };
        ContentDigest { algorithm, bytes }
    }
}

impl fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHasher")
            .field("algorithm", &self.algorithm())
            .finish()
    }
}

/// Digest everything `reader` yields, reading `buffer_size` bytes at a time
pub fn digest_reader<R: Read>(
    mut reader: R,
    algorithm: DigestAlgorithm,
    buffer_size: usize,
) -> io::Result<ContentDigest> {
    let mut hasher = ContentHasher::new(algorithm);
    let mut buffer = vec![0u8; buffer_size.max(1)];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}
