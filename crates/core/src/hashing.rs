//! Shared SHA-256 hex digest utilities.
//!
//! Used by the sync crate for asset fingerprinting and by tests that need
//! known digests without duplicating the computation.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Incremental SHA-256 hasher for content that is read in chunks.
///
/// Asset files can be multiple gigabytes, so fingerprinting feeds the
/// hasher chunk by chunk instead of buffering the whole file.
pub struct StreamingHasher {
    inner: Sha256,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Feed a chunk of content into the hash.
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    /// Finalize and return the lowercase hex digest.
    pub fn finish(self) -> String {
        let hash = self.inner.finalize();
        format!("{hash:x}")
    }
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}
