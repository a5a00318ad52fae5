//! Identity key management
//!
//! Each user has one long-term X25519 key pair used for Diffie-Hellman
//! session establishment. The exportable half travels as a `Certificate`
//! {username, public_key} via the directory service.
//!
//! Certificate trust is a pluggable capability: the default
//! `TrustOnFirstUse` verifier accepts any certificate (first-contact
//! behaviour), while `CaVerifier` requires an Ed25519 signature from a
//! deployment-held `CertificateAuthority`. Callers pick the policy at
//! client construction time.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as ExchangePublicKey, SharedSecret, StaticSecret};

use crate::error::CryptoError;

// ── Key encoding helpers ──────────────────────────────────────────────────────

/// Encode an X25519 public key as base64url without padding, the stable
/// transport form used in certificates and message headers.
pub fn encode_exchange_key(key: &ExchangePublicKey) -> String {
    URL_SAFE_NO_PAD.encode(key.as_bytes())
}

pub fn decode_exchange_key(encoded: &str) -> Result<ExchangePublicKey, CryptoError> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded)?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("exchange key must be 32 bytes".into()))?;
    Ok(ExchangePublicKey::from(arr))
}

/// Human-readable key fingerprint: BLAKE3 of the public key truncated to
/// 20 bytes, hex in groups of 4 for manual comparison.
pub fn fingerprint(key: &ExchangePublicKey) -> String {
    let hash = blake3::hash(key.as_bytes());
    let hex = hex::encode(&hash.as_bytes()[..20]);
    hex.chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Identity ──────────────────────────────────────────────────────────────────

/// Long-term per-user identity. The secret half never leaves process
/// memory; `StaticSecret` zeroizes itself on drop.
pub struct Identity {
    username: String,
    secret: StaticSecret,
    public: ExchangePublicKey,
}

impl Identity {
    pub fn generate(username: &str) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = ExchangePublicKey::from(&secret);
        Self {
            username: username.to_string(),
            secret,
            public,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn public_key(&self) -> &ExchangePublicKey {
        &self.public
    }

    /// The exportable half: what the directory service distributes.
    pub fn certificate(&self) -> Certificate {
        Certificate {
            username: self.username.clone(),
            public_key: encode_exchange_key(&self.public),
        }
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.public)
    }

    pub fn diffie_hellman(&self, their_public: &ExchangePublicKey) -> SharedSecret {
        self.secret.diffie_hellman(their_public)
    }

    /// Clone of the long-term exchange secret, used as the first ratchet
    /// key pair of a freshly established session.
    pub(crate) fn exchange_secret(&self) -> StaticSecret {
        StaticSecret::from(self.secret.to_bytes())
    }
}

// ── Certificate ───────────────────────────────────────────────────────────────

/// Public identity material {username, public key}. Immutable once issued;
/// JSON-serialisable for the directory service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub username: String,
    /// X25519 public key, base64url without padding.
    pub public_key: String,
}

impl Certificate {
    pub fn exchange_key(&self) -> Result<ExchangePublicKey, CryptoError> {
        decode_exchange_key(&self.public_key)
    }
}

/// A certificate together with its issuance proof. `signature` is an
/// Ed25519 signature over the canonical JSON payload, made by a
/// certificate authority; empty for unattested (trust-on-first-use)
/// exchanges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedCertificate {
    pub certificate: Certificate,
    pub issued_at: DateTime<Utc>,
    /// Base64-encoded Ed25519 signature, or empty when unattested.
    pub signature: String,
}

impl SignedCertificate {
    /// Wrap a bare certificate with no authority attestation. Accepted
    /// only by `TrustOnFirstUse`.
    pub fn unattested(certificate: Certificate) -> Self {
        Self {
            certificate,
            issued_at: Utc::now(),
            signature: String::new(),
        }
    }

    /// Canonical payload the authority signs. Field ordering MUST be
    /// stable (serde_json's `json!` serialises maps alphabetically).
    fn canonical_payload(
        certificate: &Certificate,
        issued_at: &DateTime<Utc>,
    ) -> Result<Vec<u8>, CryptoError> {
        let payload = serde_json::json!({
            "issued_at": issued_at.to_rfc3339(),
            "public_key": certificate.public_key,
            "username": certificate.username,
        });
        Ok(serde_json::to_vec(&payload)?)
    }
}

// ── Certificate authority ─────────────────────────────────────────────────────

/// Ed25519 signing authority for certificate issuance. Held by the
/// deployment, not by individual users.
pub struct CertificateAuthority {
    signing: SigningKey,
}

impl CertificateAuthority {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    pub fn issue(&self, certificate: Certificate) -> Result<SignedCertificate, CryptoError> {
        let issued_at = Utc::now();
        let payload = SignedCertificate::canonical_payload(&certificate, &issued_at)?;
        let signature = self.signing.sign(&payload);
        Ok(SignedCertificate {
            certificate,
            issued_at,
            signature: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
        })
    }
}

// ── Verification capability ───────────────────────────────────────────────────

/// Policy deciding whether a received certificate may be trusted.
pub trait CertificateVerifier: Send + Sync {
    fn verify(&self, signed: &SignedCertificate) -> Result<(), CryptoError>;
}

/// Accepts every certificate unconditionally. This mirrors first-contact
/// messaging deployments where key continuity, not issuance, is the trust
/// anchor. It is the default policy.
pub struct TrustOnFirstUse;

impl CertificateVerifier for TrustOnFirstUse {
    fn verify(&self, _signed: &SignedCertificate) -> Result<(), CryptoError> {
        Ok(())
    }
}

/// Requires a valid authority signature on every certificate.
pub struct CaVerifier {
    authority: VerifyingKey,
}

impl CaVerifier {
    pub fn new(authority: VerifyingKey) -> Self {
        Self { authority }
    }
}

impl CertificateVerifier for CaVerifier {
    fn verify(&self, signed: &SignedCertificate) -> Result<(), CryptoError> {
        if signed.signature.is_empty() {
            return Err(CryptoError::CertificateValidation(
                "certificate carries no authority signature".into(),
            ));
        }
        let payload =
            SignedCertificate::canonical_payload(&signed.certificate, &signed.issued_at)?;
        let sig_bytes = URL_SAFE_NO_PAD.decode(&signed.signature)?;
        let sig_arr: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("signature must be 64 bytes".into()))?;
        let signature = Signature::from_bytes(&sig_arr);
        self.authority
            .verify(&payload, &signature)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_exports_usable_key() {
        let alice = Identity::generate("alice");
        let cert = alice.certificate();
        assert_eq!(cert.username, "alice");
        let decoded = cert.exchange_key().unwrap();
        assert_eq!(decoded.as_bytes(), alice.public_key().as_bytes());
    }

    #[test]
    fn fingerprint_is_grouped_hex() {
        let alice = Identity::generate("alice");
        let fp = alice.fingerprint();
        assert_eq!(fp.split(' ').count(), 10);
        assert!(fp.split(' ').all(|g| g.len() == 4));
    }

    #[test]
    fn authority_signature_verifies() {
        let ca = CertificateAuthority::generate();
        let bob = Identity::generate("bob");
        let signed = ca.issue(bob.certificate()).unwrap();

        let verifier = CaVerifier::new(ca.verifying_key());
        verifier.verify(&signed).unwrap();
    }

    #[test]
    fn tampered_certificate_rejected() {
        let ca = CertificateAuthority::generate();
        let bob = Identity::generate("bob");
        let mut signed = ca.issue(bob.certificate()).unwrap();
        signed.certificate.username = "mallory".into();

        let verifier = CaVerifier::new(ca.verifying_key());
        assert!(matches!(
            verifier.verify(&signed),
            Err(CryptoError::SignatureVerification)
        ));
    }

    #[test]
    fn unattested_certificate_rejected_by_ca_policy() {
        let ca = CertificateAuthority::generate();
        let bob = Identity::generate("bob");
        let signed = SignedCertificate::unattested(bob.certificate());

        let verifier = CaVerifier::new(ca.verifying_key());
        assert!(verifier.verify(&signed).is_err());
        TrustOnFirstUse.verify(&signed).unwrap();
    }
}
