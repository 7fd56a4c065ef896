//! Content fingerprinting for duplicate detection
//!
//! **Algorithm:**
//! 1. Read the full file content into memory
//! 2. SHA-256 over the content, rendered as lowercase hex
//! 3. When the strong digest is disabled, a weak 32-bit fingerprint over
//!    name, size, mtime and the first/last 1024 bytes instead
//!
//! Weak fingerprints are deterministic for identical
//! `(name, size, last_modified, content)` tuples but collide easily, so they
//! are advisory only.

use crate::error::HashError;
use crate::models::{Fingerprint, RomFile};
use sha2::{Digest, Sha256};

/// Bytes taken from each end of the content for the weak fingerprint
pub const WEAK_WINDOW_BYTES: usize = 1024;

/// Computes content fingerprints
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    strong_digest: bool,
}

impl ContentHasher {
    /// Create a hasher; `strong_digest = false` forces the weak path
    pub fn new(strong_digest: bool) -> Self {
        Self { strong_digest }
    }

    pub fn strong_digest(&self) -> bool {
        self.strong_digest
    }

    /// Fingerprint a file's content
    ///
    /// Returns `HashUnavailable` when the content cannot be read.
    pub async fn hash(&self, file: &RomFile) -> Result<Fingerprint, HashError> {
        tracing::debug!(file = %file.name, size = file.size, "Calculating fingerprint");

        let content = file.read_all().await.map_err(|e| {
            HashError::HashUnavailable(format!("Failed to read {}: {}", file.name, e))
        })?;

        let weak = weak_fingerprint(&file.name, file.size, file.last_modified, &content);

        if !self.strong_digest {
            tracing::debug!(file = %file.name, fingerprint = %weak, "Calculated weak fingerprint");
            return Ok(Fingerprint::weak(weak));
        }

        // CPU-bound digest off the async worker
        let digest = tokio::task::spawn_blocking(move || sha256_hex(&content)).await;

        match digest {
            Ok(value) => {
                tracing::debug!(file = %file.name, hash_len = value.len(), "Calculated SHA-256");
                Ok(Fingerprint::sha256(value))
            }
            Err(e) => {
                tracing::warn!(
                    file = %file.name,
                    error = %e,
                    "SHA-256 task failed, falling back to weak fingerprint"
                );
                Ok(Fingerprint::weak(weak))
            }
        }
    }

    /// Fingerprint from metadata alone, for files whose content is unreadable
    pub fn metadata_fingerprint(&self, file: &RomFile) -> Fingerprint {
        Fingerprint::metadata_only(weak_fingerprint(
            &file.name,
            file.size,
            file.last_modified,
            &[],
        ))
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(true)
    }
}

/// SHA-256 of a buffer as lowercase hex
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Deterministic 32-bit rolling hash, rendered as 8 hex digits
///
/// Input is the concatenation of the name, decimal size, decimal mtime, the
/// first 1024 content bytes and the last 1024 content bytes (the windows
/// overlap for short files). Each step is `hash = hash * 31 + code` with
/// wrapping 32-bit arithmetic; names contribute UTF-16 code units and
/// content bytes contribute their byte value.
pub fn weak_fingerprint(name: &str, size: u64, last_modified: i64, content: &[u8]) -> String {
    let head = &content[..content.len().min(WEAK_WINDOW_BYTES)];
    let tail = &content[content.len().saturating_sub(WEAK_WINDOW_BYTES)..];

    let size_text = size.to_string();
    let mtime_text = last_modified.to_string();

    let codes = name
        .encode_utf16()
        .chain(size_text.encode_utf16())
        .chain(mtime_text.encode_utf16())
        .chain(head.iter().map(|&b| u16::from(b)))
        .chain(tail.iter().map(|&b| u16::from(b)));

    let hash = codes.fold(0u32, |hash, code| {
        hash.wrapping_mul(31).wrapping_add(u32::from(code))
    });

    format!("{:08x}", hash)
}
