//! Content digests for copy verification

use ingest_types::{ChecksumAlgorithm, Error, Result};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Incremental digest over a byte stream
pub enum ContentHasher {
    /// SHA-256 (sha2)
    Sha256(sha2::Sha256),
    /// BLAKE3
    Blake3(Box<blake3::Hasher>),
}

impl ContentHasher {
    /// Create a hasher for `algorithm`
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::default()),
            ChecksumAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// Feed more bytes
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(hasher) => {
                use sha2::Digest;
                hasher.update(data);
            }
            Self::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    /// Finish and return the lowercase hex digest
    pub fn finalize(self) -> String {
        match self {
            Self::Sha256(hasher) => {
                use sha2::Digest;
                format!("{:x}", hasher.finalize())
            }
            Self::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
        }
    }
}

/// Digest the whole file at `path`
pub async fn hash_file(
    path: &Path,
    algorithm: ChecksumAlgorithm,
    buffer_size: usize,
) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::io_at(path, &e))?;
    let mut hasher = ContentHasher::new(algorithm);
    let mut buffer = vec![0u8; buffer_size.max(1)];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .map_err(|e| Error::io_at(path, &e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}
