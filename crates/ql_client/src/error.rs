use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("No certificate received for peer {0}")]
    MissingCertificate(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] ql_crypto::CryptoError),

    #[error("Vault error: {0}")]
    Vault(#[from] ql_vault::VaultError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
