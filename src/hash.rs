//! Content fingerprinting for duplicate detection
//!
//! Computes SHA-256 digests of raw file bytes, streamed in fixed-size
//! blocks so arbitrarily large files never need full buffering. The file
//! hash is the deduplication key for re-ingestion: identical name plus
//! identical hash means the second ingest is a no-op.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::warn;

const BLOCK_SIZE: usize = 64 * 1024;

/// Hash a file's raw bytes.
///
/// Returns the lowercase hex digest, or an empty string if the file cannot
/// be read. An empty string means "hash unavailable" and must never be
/// compared as a valid digest; callers fall back to an unconditional-replace
/// policy instead.
pub fn hash_file(path: &Path) -> String {
    match try_hash_file(path) {
        Ok(digest) => digest,
        Err(e) => {
            warn!(path = %path.display(), "Failed to hash file: {}", e);
            String::new()
        }
    }
}

fn try_hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut block = vec![0u8; BLOCK_SIZE];

    loop {
        let n = file.read(&mut block)?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash an in-memory byte buffer.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
