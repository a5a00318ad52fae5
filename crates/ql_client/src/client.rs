//! Per-user facade binding one identity, one session store, and one
//! keychain.
//!
//! The client owns its certificate and session maps explicitly; nothing
//! is process-global, so several independent clients can coexist and
//! teardown is dropping the value.
//!
//! Locking discipline: each peer session sits behind its own `Mutex`, so
//! at most one ratchet mutation is in flight per peer while traffic to
//! different peers interleaves freely. The keychain has a single lock of
//! its own. Certificate ingestion takes the store's write lock and is
//! therefore serialised with session establishment for that peer.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, RwLock};

use ql_crypto::{
    escrow::EscrowKey,
    identity::{Certificate, CertificateVerifier, Identity, SignedCertificate, TrustOnFirstUse},
    kdf::SALT_LEN,
    ratchet::PeerSession,
};
use ql_proto::{Envelope, MessageContent};
use ql_vault::{Keychain, VaultExport};

use crate::error::ClientError;

/// Deployment-chosen capabilities.
pub struct ClientConfig {
    /// Certificate trust policy. Defaults to trust-on-first-use.
    pub verifier: Arc<dyn CertificateVerifier>,
    /// When set, every sent message carries an escrow copy of its
    /// message key.
    pub escrow: Option<EscrowKey>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            verifier: Arc::new(TrustOnFirstUse),
            escrow: None,
        }
    }
}

pub struct Client {
    identity: Identity,
    config: ClientConfig,
    certificates: RwLock<HashMap<String, Certificate>>,
    sessions: RwLock<HashMap<String, Arc<Mutex<PeerSession>>>>,
    keychain: Mutex<Keychain>,
}

impl Client {
    /// Create a client: a fresh identity plus a keychain derived from the
    /// password. `existing_salt` is the login path reusing the persisted
    /// salt. Returns the certificate to publish to the directory.
    pub fn init(
        username: &str,
        password: &str,
        existing_salt: Option<[u8; SALT_LEN]>,
        config: ClientConfig,
    ) -> Result<(Self, Certificate), ClientError> {
        let identity = Identity::generate(username);
        let keychain = Keychain::create(password, existing_salt)?;
        let certificate = identity.certificate();

        tracing::info!(username, "client initialised");

        Ok((
            Self {
                identity,
                config,
                certificates: RwLock::new(HashMap::new()),
                sessions: RwLock::new(HashMap::new()),
                keychain: Mutex::new(keychain),
            },
            certificate,
        ))
    }

    pub fn username(&self) -> &str {
        self.identity.username()
    }

    pub fn certificate(&self) -> Certificate {
        self.identity.certificate()
    }

    /// Key fingerprint for out-of-band comparison.
    pub fn fingerprint(&self) -> String {
        self.identity.fingerprint()
    }

    // ── Certificates and sessions ────────────────────────────────────────

    /// Ingest a peer certificate fetched from the directory, applying the
    /// configured trust policy.
    pub async fn receive_certificate(&self, signed: SignedCertificate) -> Result<(), ClientError> {
        self.config.verifier.verify(&signed)?;
        let certificate = signed.certificate;
        tracing::debug!(peer = %certificate.username, "certificate accepted");
        self.certificates
            .write()
            .await
            .insert(certificate.username.clone(), certificate);
        Ok(())
    }

    async fn session_for(&self, peer: &str) -> Result<Arc<Mutex<PeerSession>>, ClientError> {
        if let Some(session) = self.sessions.read().await.get(peer) {
            return Ok(session.clone());
        }

        let certificate = self
            .certificates
            .read()
            .await
            .get(peer)
            .cloned()
            .ok_or_else(|| ClientError::MissingCertificate(peer.to_string()))?;

        let mut sessions = self.sessions.write().await;
        // Another task may have established it between the locks.
        if let Some(session) = sessions.get(peer) {
            return Ok(session.clone());
        }
        let session = PeerSession::establish(&self.identity, &certificate)?;
        let session = Arc::new(Mutex::new(session));
        sessions.insert(peer.to_string(), session.clone());
        Ok(session)
    }

    // ── Messaging ────────────────────────────────────────────────────────

    /// Encrypt one message to `peer`, establishing the session on first
    /// use. Fails with `MissingCertificate` until the peer's certificate
    /// has been received.
    pub async fn encrypt(
        &self,
        peer: &str,
        content: &MessageContent,
    ) -> Result<Envelope, ClientError> {
        let session = self.session_for(peer).await?;
        let plaintext = serde_json::to_vec(content)?;

        let mut session = session.lock().await;
        let (header, ciphertext) =
            session.seal_message(&plaintext, self.config.escrow.as_ref())?;
        Ok(Envelope::new(header, &ciphertext))
    }

    /// Decrypt an envelope received from `peer`.
    pub async fn decrypt(
        &self,
        peer: &str,
        envelope: &Envelope,
    ) -> Result<MessageContent, ClientError> {
        let session = self.session_for(peer).await?;
        let ciphertext = envelope.ciphertext()?;

        let mut session = session.lock().await;
        let plaintext = session.open_message(envelope.header(), &ciphertext)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    // ── Vault ────────────────────────────────────────────────────────────

    pub async fn vault_set(&self, name: &str, value: &str) -> Result<(), ClientError> {
        Ok(self.keychain.lock().await.set(name, value)?)
    }

    pub async fn vault_get(&self, name: &str) -> Result<Option<String>, ClientError> {
        Ok(self.keychain.lock().await.get(name)?)
    }

    pub async fn vault_remove(&self, name: &str) -> bool {
        self.keychain.lock().await.remove(name)
    }

    pub async fn vault_dump<T: Serialize>(&self, records: &[T]) -> Result<VaultExport, ClientError> {
        Ok(self.keychain.lock().await.dump(records)?)
    }

    pub async fn vault_load<T: DeserializeOwned>(
        &self,
        encrypted_vault: &str,
        vault_integrity: &str,
    ) -> Result<Vec<T>, ClientError> {
        Ok(self
            .keychain
            .lock()
            .await
            .load(encrypted_vault, vault_integrity)?)
    }

    /// The salt to persist out-of-band for the next login.
    pub async fn vault_salt(&self) -> [u8; SALT_LEN] {
        *self.keychain.lock().await.salt()
    }

    /// Check a candidate password against this client's keychain.
    pub async fn verify_password(&self, password: &str) -> bool {
        let keychain = self.keychain.lock().await;
        Keychain::unlock_check(password, keychain.salt(), keychain.verifier())
    }
}
