use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Invalid password")]
    InvalidPassword,

    #[error("Integrity check failed: stored vault is stale or corrupted")]
    IntegrityCheckFailed,

    #[error("Invalid vault format: {0}")]
    InvalidFormat(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] ql_crypto::CryptoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
