//! Plaintext message types (inside the encrypted envelope).
//!
//! The kind of a message is an explicit discriminator decided at the
//! serialisation boundary. Receivers never guess at the payload shape.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// Deserialised plaintext carried inside an envelope ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        body: String,
    },
    File {
        name: String,
        mime: String,
        /// File bytes, standard base64.
        data: String,
    },
}

impl MessageContent {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    pub fn file(name: impl Into<String>, mime: impl Into<String>, bytes: &[u8]) -> Self {
        Self::File {
            name: name.into(),
            mime: mime.into(),
            data: STANDARD.encode(bytes),
        }
    }
}
