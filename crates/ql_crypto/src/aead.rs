//! Authenticated Encryption with Associated Data
//!
//! Uses AES-256-GCM.  Key size: 32 bytes.  Nonce: 12 bytes (random,
//! caller-supplied).  Tag: 16 bytes.
//!
//! The nonce is NOT prepended to the ciphertext: every wire and storage
//! format in this workspace carries it in its own field (message headers,
//! vault verifiers and entries), so callers pass it explicitly on both
//! sides.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Generate a fresh random 12-byte nonce.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt `plaintext` with a 32-byte key and a caller-supplied nonce.
/// `aad` is authenticated but not encrypted.
pub fn seal(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadSeal)?;
    cipher
        .encrypt(nonce.into(), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadSeal)
}

/// Decrypt ciphertext+tag bytes. Fails closed on any tag mismatch; no
/// partial plaintext is ever returned.
pub fn open(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadOpen)?;
    let plaintext = cipher
        .decrypt(nonce.into(), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::AeadOpen)?;
    Ok(Zeroizing::new(plaintext))
}
