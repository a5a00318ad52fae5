//! ql_proto — Wire types and serialisation for Quietline
//!
//! All on-wire types are JSON-serialisable. The envelope keeps the
//! 2-element `[header, ciphertext]` shape the relay collaborators expect.
//!
//! # Modules
//! - `envelope` — encrypted message envelope (what the relay sees)
//! - `message`  — plaintext message types (inside the ciphertext)

pub mod envelope;
pub mod message;

pub use envelope::Envelope;
pub use message::MessageContent;
