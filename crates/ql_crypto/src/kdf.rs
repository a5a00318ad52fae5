//! Key derivation functions
//!
//! `stretch_password` — PBKDF2-HMAC-SHA256, derives the 32-byte master key
//!   that encrypts the local keychain.
//!
//! `derive_two_keys` / `chain_step` — HKDF-SHA256 derivations used by the
//!   ratchet session engine.

use hkdf::Hkdf;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

/// PBKDF2 round count. Fixed: both sides of a stored vault must agree, and
/// lowering it would weaken every previously created vault.
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Salt length for password stretching.
pub const SALT_LEN: usize = 16;

// ── Master key (PBKDF2) ───────────────────────────────────────────────────────

/// 32-byte master key derived from a user password. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct MasterKey(pub [u8; 32]);

/// Derive a master key from a user password + 16-byte salt.
/// The salt is stored alongside the encrypted vault (not secret).
pub fn stretch_password(password: &[u8], salt: &[u8; SALT_LEN]) -> MasterKey {
    let mut output = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ROUNDS, &mut output);
    MasterKey(output)
}

/// Generate a fresh random 16-byte salt (registration path; persist it).
pub fn generate_salt() -> [u8; SALT_LEN] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

// ── HKDF-SHA256 ───────────────────────────────────────────────────────────────

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
///
/// `salt` may be `None` (HKDF will use a zeroed salt).
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Extract-then-expand 64 bytes from `ikm` under `salt` and `info`, split
/// into two 32-byte keys.
///
/// The ratchet uses this for both (root_key, chain_key) pairs: `ikm` is the
/// fresh DH output and `salt` the current root key.
pub fn derive_two_keys(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let mut okm = [0u8; 64];
    hkdf_expand(ikm, Some(salt), info, &mut okm)?;
    let mut first = [0u8; 32];
    let mut second = [0u8; 32];
    first.copy_from_slice(&okm[..32]);
    second.copy_from_slice(&okm[32..]);
    use zeroize::Zeroize;
    okm.zeroize();
    Ok((first, second))
}

/// Advance a chain key one step: (message_key, next_chain_key).
///
/// The two outputs come from independent HKDF info labels, so neither the
/// message key nor the next chain key can be recovered from the other.
pub fn chain_step(chain_key: &[u8; 32]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, chain_key);
    let mut message_key = [0u8; 32];
    let mut next_chain_key = [0u8; 32];
    hk.expand(b"message-key", &mut message_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    hk.expand(b"next-chain-key", &mut next_chain_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok((message_key, next_chain_key))
}
