//! Content hashing
//!
//! SHA-256 over the full content, rendered as lowercase hex. The digest is the
//! identity used for deduplication.

use cairn_core::AppError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Hex-encoded SHA-256 of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Parse a digest produced elsewhere; accepts upper- or lowercase hex.
    pub fn from_hex(value: &str) -> Result<Self, AppError> {
        let normalized = value.trim().to_lowercase();
        if normalized.len() != 64 || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AppError::InvalidInput(format!(
                "not a SHA-256 hex digest: {}",
                value
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentDigest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub struct ContentHasher;

impl ContentHasher {
    pub fn digest(data: &[u8]) -> ContentDigest {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Hash a stream without buffering it whole. Returns the digest and byte count.
    pub async fn digest_reader<R>(mut reader: R) -> Result<(ContentDigest, u64), AppError>
    where
        R: AsyncRead + Unpin,
    {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let mut total = 0u64;

        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to read content: {}", e)))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            total += n as u64;
        }

        Ok((ContentDigest(hex::encode(hasher.finalize())), total))
    }
}
