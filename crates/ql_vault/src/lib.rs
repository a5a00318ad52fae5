//! ql_vault — Encrypted credential keychain for Quietline
//!
//! # Encryption strategy
//! - Master key from (password, salt) via PBKDF2; in memory only,
//!   zeroized on drop.
//! - AES-256-GCM for the whole-list blob and for per-entry ciphertexts.
//! - A SHA-256 tag over the encoded blob detects rollback of the stored
//!   copy, which an AEAD tag alone cannot.

pub mod error;
pub mod keychain;

pub use error::VaultError;
pub use keychain::{Keychain, VaultExport, Verifier};
