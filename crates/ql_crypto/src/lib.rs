//! ql_crypto — Quietline cryptographic primitives and session engine
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Errors are typed; AEAD failures never surface partial plaintext.
//!
//! # Module layout
//! - `identity` — long-term X25519 identity, certificates, pluggable
//!   certificate verification
//! - `ratchet`  — DH ratchet session engine with skipped message keys
//! - `escrow`   — optional message-key escrow capability
//! - `aead`     — AES-256-GCM encrypt/decrypt helpers
//! - `kdf`      — HKDF / PBKDF2 key derivation
//! - `hash`     — SHA-256 utilities (integrity tags, lookup keys)
//! - `error`    — unified error type

pub mod aead;
pub mod error;
pub mod escrow;
pub mod hash;
pub mod identity;
pub mod kdf;
pub mod ratchet;

pub use error::CryptoError;
