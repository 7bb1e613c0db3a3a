//! Checksums for published artifacts.

use sha2::{Digest, Sha256};

/// Calculate the SHA-256 checksum of artifact bytes.
///
/// # Returns
/// Hexadecimal string representation of the hash.
pub fn calculate_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
