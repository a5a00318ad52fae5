//! Keychain: authenticated encrypted record store keyed from a password.
//!
//! The master key is derived from (password, salt) via PBKDF2 and exists
//! only in memory; the salt and the integrity tag are the only values a
//! caller persists besides the encrypted blob itself. A small verifier
//! ciphertext over a fixed string lets a candidate password be checked
//! without touching real data.
//!
//! Two storage granularities, matching how collaborators use the vault:
//! - `dump`/`load` encrypt a whole record list as one blob with an
//!   integrity tag over the encoded text (detects rollback to a stale
//!   blob, which the AEAD tag alone cannot).
//! - `set`/`get`/`remove` keep per-entry ciphertexts keyed by the SHA-256
//!   of the entry name, bound to this vault and name via associated data.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

use ql_crypto::{
    aead, hash,
    kdf::{self, MasterKey, SALT_LEN},
};

use crate::error::VaultError;

/// Fixed plaintext the verifier encrypts; decrypting it proves the
/// candidate password derives the right master key.
const VERIFIER_PLAINTEXT: &[u8] = b"keychain-verification-ok";

/// Password-check ciphertext stored alongside the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verifier {
    /// AES-GCM nonce, standard base64.
    pub nonce: String,
    /// Encrypted verifier string, standard base64.
    pub ciphertext: String,
}

/// One per-entry ciphertext. The lookup key (SHA-256 of the name) lives
/// in the surrounding map, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    nonce: String,
    ciphertext: String,
}

/// What `dump` hands to the storage collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultExport {
    pub encrypted_vault: String,
    pub vault_integrity: String,
}

/// Serialisable keychain state, everything except the master key.
#[derive(Serialize, Deserialize)]
struct KeychainState {
    salt: String,
    vault_id: String,
    verifier: Verifier,
    entries: HashMap<String, Entry>,
}

pub struct Keychain {
    salt: [u8; SALT_LEN],
    /// Random id binding per-entry ciphertexts to this vault.
    vault_id: String,
    verifier: Verifier,
    entries: HashMap<String, Entry>,
    master: MasterKey,
}

impl Keychain {
    /// Create a keychain. `existing_salt` is the login path reusing the
    /// externally persisted salt; `None` is the registration path with a
    /// fresh one.
    pub fn create(password: &str, existing_salt: Option<[u8; SALT_LEN]>) -> Result<Self, VaultError> {
        let salt = existing_salt.unwrap_or_else(kdf::generate_salt);
        let master = kdf::stretch_password(password.as_bytes(), &salt);

        let nonce = aead::generate_nonce();
        let ciphertext = aead::seal(&master.0, &nonce, VERIFIER_PLAINTEXT, b"")?;
        let verifier = Verifier {
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        };

        tracing::debug!(fresh_salt = existing_salt.is_none(), "keychain created");

        Ok(Self {
            salt,
            vault_id: Uuid::new_v4().to_string(),
            verifier,
            entries: HashMap::new(),
            master,
        })
    }

    /// Persist this alongside the encrypted blob; it is required to
    /// re-derive the master key in a later session. Not secret.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Check a candidate password against a stored (salt, verifier) pair
    /// without constructing a keychain. Decryption failure means wrong
    /// password, never data corruption.
    pub fn unlock_check(password: &str, salt: &[u8; SALT_LEN], verifier: &Verifier) -> bool {
        let master = kdf::stretch_password(password.as_bytes(), salt);
        Self::check_master(&master, verifier).is_ok()
    }

    fn check_master(master: &MasterKey, verifier: &Verifier) -> Result<(), VaultError> {
        let nonce = decode_nonce(&verifier.nonce)?;
        let ciphertext = STANDARD.decode(&verifier.ciphertext)?;
        let plaintext =
            aead::open(&master.0, &nonce, &ciphertext, b"").map_err(|_| VaultError::InvalidPassword)?;
        if plaintext.as_slice() != VERIFIER_PLAINTEXT {
            return Err(VaultError::InvalidPassword);
        }
        Ok(())
    }

    // ── Whole-list blob ──────────────────────────────────────────────────

    /// Serialise and encrypt a record list for external storage.
    ///
    /// The integrity tag is a digest of the encoded text, computed so a
    /// later `load` can prove it was handed the latest blob.
    pub fn dump<T: Serialize>(&self, records: &[T]) -> Result<VaultExport, VaultError> {
        let plaintext = serde_json::to_vec(records)?;
        let nonce = aead::generate_nonce();
        let ciphertext = aead::seal(&self.master.0, &nonce, &plaintext, b"")?;

        let mut combined = Vec::with_capacity(nonce.len() + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);

        let encrypted_vault = STANDARD.encode(combined);
        let vault_integrity = hash::sha256_b64(encrypted_vault.as_bytes());

        tracing::debug!(records = records.len(), "vault dumped");
        Ok(VaultExport {
            encrypted_vault,
            vault_integrity,
        })
    }

    /// Decrypt a stored blob after proving it is the one the tag was
    /// computed over. A tag mismatch means rollback or tampering of the
    /// stored blob and is never auto-recovered.
    pub fn load<T: DeserializeOwned>(
        &self,
        encrypted_vault: &str,
        vault_integrity: &str,
    ) -> Result<Vec<T>, VaultError> {
        if hash::sha256_b64(encrypted_vault.as_bytes()) != vault_integrity {
            tracing::debug!("vault integrity tag mismatch");
            return Err(VaultError::IntegrityCheckFailed);
        }

        let combined = STANDARD.decode(encrypted_vault)?;
        if combined.len() < aead::NONCE_LEN {
            return Err(VaultError::InvalidFormat("blob shorter than nonce".into()));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(aead::NONCE_LEN);
        let nonce: [u8; aead::NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| VaultError::InvalidFormat("bad nonce length".into()))?;

        let plaintext = aead::open(&self.master.0, &nonce, ciphertext, b"")?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    // ── Per-entry operations ─────────────────────────────────────────────

    /// Insert or replace an entry. The stored key is the hash of the
    /// name; the ciphertext is bound to (vault id, name) so entries
    /// cannot be swapped between vaults or renamed undetected.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), VaultError> {
        let nonce = aead::generate_nonce();
        let ciphertext = aead::seal(
            &self.master.0,
            &nonce,
            value.as_bytes(),
            &self.entry_aad(name),
        )?;
        self.entries.insert(
            hash::lookup_key(name),
            Entry {
                nonce: STANDARD.encode(nonce),
                ciphertext: STANDARD.encode(ciphertext),
            },
        );
        Ok(())
    }

    /// Fetch an entry. Unknown names are `None`; a tampered or foreign
    /// entry is an authentication error.
    pub fn get(&self, name: &str) -> Result<Option<String>, VaultError> {
        let entry = match self.entries.get(&hash::lookup_key(name)) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let nonce = decode_nonce(&entry.nonce)?;
        let ciphertext = STANDARD.decode(&entry.ciphertext)?;
        let plaintext = aead::open(&self.master.0, &nonce, &ciphertext, &self.entry_aad(name))?;
        let value = String::from_utf8(plaintext.to_vec())
            .map_err(|_| VaultError::InvalidFormat("entry is not UTF-8".into()))?;
        Ok(Some(value))
    }

    /// Returns whether the entry existed.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(&hash::lookup_key(name)).is_some()
    }

    fn entry_aad(&self, name: &str) -> Vec<u8> {
        let mut aad = Vec::with_capacity(self.vault_id.len() + name.len());
        aad.extend_from_slice(self.vault_id.as_bytes());
        aad.extend_from_slice(name.as_bytes());
        aad
    }

    // ── Whole-keychain persistence ───────────────────────────────────────

    /// Serialise the full keychain state (salt, vault id, verifier,
    /// entries; never the master key) plus an integrity tag over the
    /// representation.
    pub fn export_state(&self) -> Result<(String, String), VaultError> {
        let state = KeychainState {
            salt: STANDARD.encode(self.salt),
            vault_id: self.vault_id.clone(),
            verifier: self.verifier.clone(),
            entries: self.entries.clone(),
        };
        let repr = serde_json::to_string(&state)?;
        let check = hash::sha256_b64(repr.as_bytes());
        Ok((repr, check))
    }

    /// Rebuild a keychain from an exported representation. Enforces the
    /// rollback check first, then proves the password via the verifier.
    pub fn import_state(password: &str, repr: &str, check: &str) -> Result<Self, VaultError> {
        if hash::sha256_b64(repr.as_bytes()) != check {
            return Err(VaultError::IntegrityCheckFailed);
        }
        let state: KeychainState =
            serde_json::from_str(repr).map_err(VaultError::Serialisation)?;

        let mut salt_bytes = STANDARD.decode(&state.salt)?;
        let salt: [u8; SALT_LEN] = salt_bytes
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::InvalidFormat("salt must be 16 bytes".into()))?;
        salt_bytes.zeroize();

        let master = kdf::stretch_password(password.as_bytes(), &salt);
        Self::check_master(&master, &state.verifier)?;

        tracing::debug!(entries = state.entries.len(), "keychain imported");
        Ok(Self {
            salt,
            vault_id: state.vault_id,
            verifier: state.verifier,
            entries: state.entries,
            master,
        })
    }
}

fn decode_nonce(encoded: &str) -> Result<[u8; aead::NONCE_LEN], VaultError> {
    let bytes = STANDARD.decode(encoded)?;
    bytes
        .try_into()
        .map_err(|_| VaultError::InvalidFormat("nonce must be 12 bytes".into()))
}
