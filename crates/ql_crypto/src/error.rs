use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AEAD encryption failed")]
    AeadSeal,

    #[error("AEAD decryption failed: authentication tag mismatch (possible tampering)")]
    AeadOpen,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Signature verification failed")]
    SignatureVerification,

    #[error("Certificate validation failed: {0}")]
    CertificateValidation(String),

    #[error("Session not established")]
    SessionNotEstablished,

    #[error("Message not addressed to this session: {0}")]
    MisdirectedMessage(String),

    #[error("Message replay or out of sequence: {0}")]
    OutOfSequence(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
