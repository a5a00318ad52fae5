//! DH ratchet session engine
//!
//! State separation:
//!   root_key        — updated on every DH ratchet step
//!   send_chain_key  — advanced per sent message
//!   recv_chain_key  — advanced per received message
//!   message key     — derived from a chain key, used once, then deleted
//!
//! Each party adopts a fresh X25519 ratchet key pair when its turn to send
//! follows a received ratchet step. The DH output is mixed into the root
//! key via HKDF, producing a new root key and a new chain key.
//!
//! Skipped message keys are cached so reordering or loss within a chain
//! does not desynchronise the two parties. The cache is bounded: a drain
//! of more than [`MAX_SKIP`] keys is rejected, and the oldest cached keys
//! are evicted beyond that bound.

use std::collections::{HashMap, VecDeque};

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as ExchangePublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::{
    aead,
    error::CryptoError,
    escrow::{EscrowEnvelope, EscrowKey},
    identity::{decode_exchange_key, encode_exchange_key, Certificate, Identity},
    kdf,
};

/// Maximum number of message keys derived ahead of delivery order, per
/// session. Caps both a single chain drain and the cache itself, so a
/// hostile or broken sender cannot grow memory without bound.
pub const MAX_SKIP: u64 = 256;

const INITIAL_INFO: &[u8] = b"initial-key-derivation";
const RATCHET_INFO: &[u8] = b"ratchet-step";

// ── Message header (sent unencrypted alongside every ciphertext) ─────────────

/// Everything the receiver needs to advance its ratchet and locate the
/// message key: chain position, previous chain length, the sender's
/// current ratchet public key, and the AEAD nonce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    pub sender: String,
    pub receiver: String,
    /// 1-based position in the sender's current chain.
    pub count: u64,
    /// Length of the sender's previous chain at the last DH ratchet.
    pub prev_count: u64,
    /// Sender's current ratchet public key, base64url without padding.
    pub ratchet_key: String,
    /// AES-GCM nonce for this message, standard base64.
    pub nonce: String,
    /// Escrow copy of the message key, when the sender is so configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow: Option<EscrowEnvelope>,
}

// ── Session state ────────────────────────────────────────────────────────────

/// Ratchet state for one remote peer. One in-flight mutation at a time;
/// callers serialise access (the facade wraps each session in a lock).
pub struct PeerSession {
    local_username: String,
    peer_username: String,

    root_key: [u8; 32],
    send_chain_key: Option<[u8; 32]>,
    recv_chain_key: Option<[u8; 32]>,

    /// Our current ratchet key pair. Starts as the identity pair and is
    /// replaced by a fresh ephemeral pair on every sending ratchet step.
    ratchet_secret: StaticSecret,
    ratchet_public: ExchangePublicKey,
    /// Peer's latest known ratchet (or long-term) public key.
    their_ratchet_key: ExchangePublicKey,

    /// 1-based counters within the current chains.
    send_count: u64,
    recv_count: u64,
    /// Our previous sending chain length at the last DH ratchet.
    prev_chain_len: u64,

    /// (sender ratchet key base64, 1-based index) → message key, for keys
    /// derived ahead of delivery order but not yet consumed.
    skipped_keys: HashMap<(String, u64), [u8; 32]>,
    /// Insertion order of `skipped_keys`, for oldest-first eviction.
    skipped_order: VecDeque<(String, u64)>,

    /// A fresh DH ratchet step is owed before the next send.
    send_ratchet_pending: bool,
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        self.root_key.zeroize();
        if let Some(ref mut ck) = self.send_chain_key {
            ck.zeroize();
        }
        if let Some(ref mut ck) = self.recv_chain_key {
            ck.zeroize();
        }
        for (_, mk) in self.skipped_keys.iter_mut() {
            mk.zeroize();
        }
    }
}

impl PeerSession {
    /// Establish a session from the peer's certificate (first contact).
    ///
    /// The initial root key is derived from the long-term DH secret used
    /// as both key material and HKDF salt. That mirrors the paired
    /// implementations of this protocol; both sides must agree on it.
    pub fn establish(identity: &Identity, peer: &Certificate) -> Result<Self, CryptoError> {
        let their_key = peer.exchange_key()?;
        let shared = identity.diffie_hellman(&their_key);
        let (root_key, _) =
            kdf::derive_two_keys(shared.as_bytes(), shared.as_bytes(), INITIAL_INFO)?;

        tracing::debug!(peer = %peer.username, "session established");

        Ok(Self {
            local_username: identity.username().to_string(),
            peer_username: peer.username.clone(),
            root_key,
            send_chain_key: None,
            recv_chain_key: None,
            ratchet_secret: identity.exchange_secret(),
            ratchet_public: *identity.public_key(),
            their_ratchet_key: their_key,
            send_count: 0,
            recv_count: 0,
            prev_chain_len: 0,
            skipped_keys: HashMap::new(),
            skipped_order: VecDeque::new(),
            send_ratchet_pending: true,
        })
    }

    pub fn peer_username(&self) -> &str {
        &self.peer_username
    }

    // ── Send ─────────────────────────────────────────────────────────────

    /// Encrypt one message, advancing the sending chain.
    ///
    /// Returns the wire header and the raw ciphertext. Chain key and
    /// counter mutations commit only together with a successful
    /// encryption, so a failure leaves the session unchanged.
    pub fn seal_message(
        &mut self,
        plaintext: &[u8],
        escrow: Option<&EscrowKey>,
    ) -> Result<(MessageHeader, Vec<u8>), CryptoError> {
        if self.send_ratchet_pending {
            self.sending_ratchet_step()?;
        }

        let chain_key = self.send_chain_key.ok_or(CryptoError::SessionNotEstablished)?;
        let (mut message_key, next_chain_key) = kdf::chain_step(&chain_key)?;

        let nonce = aead::generate_nonce();
        let sealed = aead::seal(&message_key, &nonce, plaintext, b"");
        let escrow_envelope = match (&sealed, escrow) {
            (Ok(_), Some(key)) => match key.wrap(&message_key) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    message_key.zeroize();
                    return Err(e);
                }
            },
            _ => None,
        };
        message_key.zeroize();
        let ciphertext = sealed?;

        self.send_chain_key = Some(next_chain_key);
        self.send_count += 1;

        let header = MessageHeader {
            sender: self.local_username.clone(),
            receiver: self.peer_username.clone(),
            count: self.send_count,
            prev_count: self.prev_chain_len,
            ratchet_key: encode_exchange_key(&self.ratchet_public),
            nonce: STANDARD.encode(nonce),
            escrow: escrow_envelope,
        };
        Ok((header, ciphertext))
    }

    /// Adopt a fresh ratchet key pair and mix its DH output into the root
    /// key, opening a new sending chain.
    fn sending_ratchet_step(&mut self) -> Result<(), CryptoError> {
        let next_secret = StaticSecret::random_from_rng(OsRng);
        let next_public = ExchangePublicKey::from(&next_secret);
        let shared = next_secret.diffie_hellman(&self.their_ratchet_key);

        let (root_key, chain_key) =
            kdf::derive_two_keys(shared.as_bytes(), &self.root_key, RATCHET_INFO)?;
        self.root_key = root_key;
        self.send_chain_key = Some(chain_key);
        self.prev_chain_len = self.send_count;
        self.send_count = 0;
        self.ratchet_secret = next_secret;
        self.ratchet_public = next_public;
        self.send_ratchet_pending = false;

        tracing::debug!(peer = %self.peer_username, "sending DH ratchet step");
        Ok(())
    }

    // ── Receive ──────────────────────────────────────────────────────────

    /// Resolve the message key for a received message and decrypt it.
    ///
    /// Handles, in order: a cached skipped key (out-of-order delivery), a
    /// ratchet step by the peer (draining the old receive chain first),
    /// and forward derivation within the current chain.
    pub fn open_message(
        &mut self,
        header: &MessageHeader,
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if header.receiver != self.local_username || header.sender != self.peer_username {
            return Err(CryptoError::MisdirectedMessage(format!(
                "addressed {} -> {}, session is {} -> {}",
                header.sender, header.receiver, self.peer_username, self.local_username
            )));
        }

        let nonce_bytes = STANDARD.decode(&header.nonce)?;
        let nonce: [u8; aead::NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("message nonce must be 12 bytes".into()))?;

        // Out-of-order delivery: a key cached ahead of time is consumed
        // exactly once.
        let cache_slot = (header.ratchet_key.clone(), header.count);
        if let Some(mut message_key) = self.skipped_keys.remove(&cache_slot) {
            let plaintext = aead::open(&message_key, &nonce, ciphertext, b"");
            message_key.zeroize();
            return plaintext;
        }

        let their_new_key = decode_exchange_key(&header.ratchet_key)?;
        if their_new_key.as_bytes() != self.their_ratchet_key.as_bytes() {
            // The peer ratcheted. Keys for still-in-flight messages from
            // the previous chain are derived now, under the OLD key.
            if self.recv_chain_key.is_some() {
                let old_key = encode_exchange_key(&self.their_ratchet_key);
                self.skip_to(&old_key, header.prev_count)?;
            }
            self.receiving_ratchet_step(their_new_key)?;
        }

        // Derive ahead within the current chain for any gap before this
        // message.
        self.skip_to(&header.ratchet_key, header.count.saturating_sub(1))?;

        if header.count != self.recv_count + 1 {
            return Err(CryptoError::OutOfSequence(format!(
                "message {} (expected {})",
                header.count,
                self.recv_count + 1
            )));
        }

        let chain_key = self.recv_chain_key.ok_or(CryptoError::SessionNotEstablished)?;
        let (mut message_key, next_chain_key) = kdf::chain_step(&chain_key)?;
        self.recv_chain_key = Some(next_chain_key);
        self.recv_count += 1;

        let plaintext = aead::open(&message_key, &nonce, ciphertext, b"");
        message_key.zeroize();
        plaintext
    }

    /// Mix the peer's new ratchet key into the root key, opening a new
    /// receive chain. The next send owes a ratchet step of its own.
    fn receiving_ratchet_step(&mut self, their_new_key: ExchangePublicKey) -> Result<(), CryptoError> {
        let shared = self.ratchet_secret.diffie_hellman(&their_new_key);
        let (root_key, chain_key) =
            kdf::derive_two_keys(shared.as_bytes(), &self.root_key, RATCHET_INFO)?;
        self.root_key = root_key;
        self.recv_chain_key = Some(chain_key);
        self.their_ratchet_key = their_new_key;
        self.recv_count = 0;
        self.send_ratchet_pending = true;

        tracing::debug!(peer = %self.peer_username, "receiving DH ratchet step");
        Ok(())
    }

    /// Advance the receive chain up to message index `until` inclusive,
    /// caching each derived key under `chain_owner_key`.
    fn skip_to(&mut self, chain_owner_key: &str, until: u64) -> Result<(), CryptoError> {
        if until <= self.recv_count {
            return Ok(());
        }
        let gap = until - self.recv_count;
        if gap > MAX_SKIP {
            return Err(CryptoError::OutOfSequence(format!(
                "gap of {gap} skipped messages exceeds limit {MAX_SKIP}"
            )));
        }

        while self.recv_count < until {
            let chain_key = self.recv_chain_key.ok_or(CryptoError::SessionNotEstablished)?;
            let (message_key, next_chain_key) = kdf::chain_step(&chain_key)?;
            self.recv_chain_key = Some(next_chain_key);
            self.recv_count += 1;
            self.cache_skipped_key(chain_owner_key.to_string(), self.recv_count, message_key);
        }
        Ok(())
    }

    fn cache_skipped_key(&mut self, owner: String, index: u64, key: [u8; 32]) {
        self.skipped_keys.insert((owner.clone(), index), key);
        self.skipped_order.push_back((owner, index));

        // Evict oldest-inserted entries beyond the cap. Slots whose key
        // was already consumed pop off without effect.
        while self.skipped_keys.len() > MAX_SKIP as usize {
            match self.skipped_order.pop_front() {
                Some(oldest) => {
                    if let Some(mut evicted) = self.skipped_keys.remove(&oldest) {
                        evicted.zeroize();
                        tracing::debug!(
                            peer = %self.peer_username,
                            index = oldest.1,
                            "evicted oldest skipped message key"
                        );
                    }
                }
                None => break,
            }
        }
    }

    #[cfg(test)]
    fn skipped_len(&self) -> usize {
        self.skipped_keys.len()
    }
}
