/*!
 * Per-file and aggregate SHA-256 digests
 */

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Block size used when streaming a file through the hasher
pub const HASH_BLOCK_SIZE: usize = 1024 * 1024;

/// Stream a file through SHA-256 and return the lowercase hex digest
pub fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BLOCK_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of an in-memory buffer, hex encoded
#[cfg(test)]
pub fn bytes_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Running digest over per-file digests, in selection order
///
/// Each contribution is the raw 32 bytes behind a per-file hex digest. Files
/// without a digest contribute nothing.
#[derive(Default)]
pub struct AggregateDigest {
    hasher: Sha256,
}

impl AggregateDigest {
    /// Start an empty aggregate
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one per-file hex digest; an empty digest is skipped
    pub fn fold(&mut self, file_digest_hex: &str) {
        if file_digest_hex.is_empty() {
            return;
        }
        match hex::decode(file_digest_hex) {
            Ok(raw) => self.hasher.update(&raw),
            Err(e) => log::warn!("Skipping malformed digest '{}': {}", file_digest_hex, e),
        }
    }

    /// Finish and return the aggregate as lowercase hex
    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
