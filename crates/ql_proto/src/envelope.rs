//! Encrypted message envelope — what the relay sees.
//!
//! The relay is a DUMB forwarder: it routes by the header's sender and
//! receiver and never sees plaintext. On the wire an envelope is a
//! 2-element array `[header, ciphertext]`; the tuple struct below
//! serialises to exactly that shape.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use ql_crypto::{ratchet::MessageHeader, CryptoError};

/// On-wire envelope: `[header, ciphertext]` with base64 ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope(pub MessageHeader, pub String);

impl Envelope {
    pub fn new(header: MessageHeader, ciphertext: &[u8]) -> Self {
        Self(header, STANDARD.encode(ciphertext))
    }

    pub fn header(&self) -> &MessageHeader {
        &self.0
    }

    pub fn ciphertext(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(STANDARD.decode(&self.1)?)
    }
}
