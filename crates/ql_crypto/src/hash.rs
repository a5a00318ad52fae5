//! SHA-256 utilities
//!
//! - Integrity tags over encoded vault blobs
//! - Fixed-length lookup keys for vault entry names

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 digest in standard base64, the transport-safe form used for
/// vault integrity tags.
pub fn sha256_b64(data: &[u8]) -> String {
    STANDARD.encode(sha256(data))
}

/// Map an arbitrary entry name to a fixed-length lookup key so stored keys
/// do not leak the plaintext name.
pub fn lookup_key(name: &str) -> String {
    sha256_b64(name.as_bytes())
}
