//! Optional message-key escrow
//!
//! When a deployment supplies an escrow public key, every sent message
//! carries an independently encrypted copy of its message key so the
//! authorised holder of the escrow secret can recover the plaintext.
//! Presence or absence of the escrow block never affects the peer's
//! ability to decrypt.
//!
//! Wrap construction: fresh ephemeral X25519 pair, HKDF of the DH output
//! under the "escrow-key-wrap" label, AES-GCM over the 32-byte message key.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey as ExchangePublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::{
    aead,
    error::CryptoError,
    identity::{decode_exchange_key, encode_exchange_key},
    kdf,
};

const WRAP_INFO: &[u8] = b"escrow-key-wrap";
const WRAP_AAD: &[u8] = b"ql-escrow-v1";

/// Independently encrypted copy of a message key, carried in the message
/// header when escrow is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowEnvelope {
    /// Sender's ephemeral X25519 public key, base64url without padding.
    pub ephemeral_key: String,
    /// AES-GCM nonce, standard base64.
    pub nonce: String,
    /// Wrapped 32-byte message key, standard base64.
    pub ciphertext: String,
}

/// Externally supplied escrow public key. Holding this value enables
/// wrapping only; recovery requires the matching [`EscrowSecret`].
#[derive(Clone)]
pub struct EscrowKey {
    public: ExchangePublicKey,
}

impl EscrowKey {
    pub fn new(public: ExchangePublicKey) -> Self {
        Self { public }
    }

    pub fn from_b64(encoded: &str) -> Result<Self, CryptoError> {
        Ok(Self {
            public: decode_exchange_key(encoded)?,
        })
    }

    /// Encrypt `message_key` to the escrow holder.
    pub fn wrap(&self, message_key: &[u8; 32]) -> Result<EscrowEnvelope, CryptoError> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = ExchangePublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&self.public);

        let mut wrap_key = [0u8; 32];
        kdf::hkdf_expand(shared.as_bytes(), None, WRAP_INFO, &mut wrap_key)?;

        let nonce = aead::generate_nonce();
        let ciphertext = aead::seal(&wrap_key, &nonce, message_key, WRAP_AAD)?;
        wrap_key.zeroize();

        Ok(EscrowEnvelope {
            ephemeral_key: encode_exchange_key(&ephemeral_public),
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        })
    }
}

/// The escrow holder's secret. Kept by the authorised third party, never
/// by messaging clients.
pub struct EscrowSecret {
    secret: StaticSecret,
}

impl EscrowSecret {
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    pub fn escrow_key(&self) -> EscrowKey {
        EscrowKey::new(ExchangePublicKey::from(&self.secret))
    }

    /// Recover a wrapped message key.
    pub fn unwrap(&self, envelope: &EscrowEnvelope) -> Result<[u8; 32], CryptoError> {
        use base64::{engine::general_purpose::STANDARD, Engine};

        let ephemeral = decode_exchange_key(&envelope.ephemeral_key)?;
        let shared = self.secret.diffie_hellman(&ephemeral);

        let mut wrap_key = [0u8; 32];
        kdf::hkdf_expand(shared.as_bytes(), None, WRAP_INFO, &mut wrap_key)?;

        let nonce_bytes = STANDARD.decode(&envelope.nonce)?;
        let nonce: [u8; aead::NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("escrow nonce must be 12 bytes".into()))?;
        let ciphertext = STANDARD.decode(&envelope.ciphertext)?;

        let plaintext = aead::open(&wrap_key, &nonce, &ciphertext, WRAP_AAD)?;
        wrap_key.zeroize();

        let key: [u8; 32] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("unwrapped key wrong length".into()))?;
        Ok(key)
    }
}
