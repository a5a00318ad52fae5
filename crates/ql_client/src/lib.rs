//! ql_client — Quietline per-user session facade
//!
//! Binds one identity, one ratchet session store, and one keychain, and
//! exposes the operations external collaborators call: certificate
//! exchange, envelope encrypt/decrypt, and vault access. This crate is a
//! library; relay and directory I/O belong to the caller.

pub mod client;
pub mod error;

pub use client::{Client, ClientConfig};
pub use error::ClientError;
