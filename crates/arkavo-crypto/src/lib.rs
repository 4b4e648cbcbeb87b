//! Arkavo Cryptographic Primitives
//!
//! Sealing primitives for one-time-key messaging. The transport core
//! treats the sealed envelope as an opaque encode/decode primitive; this
//! crate supplies it.
//!
//! # Key Lifecycle
//!
//! Each message is sealed under a fresh X25519 key agreement:
//!
//! ```text
//! Sender one-time secret  x  Recipient public key
//!        │
//!        ▼
//! ECDH shared secret
//!        │
//!        ▼
//! HKDF-SHA256 → 32-byte message key
//!        │
//!        ▼
//! XChaCha20-Poly1305 → ciphertext
//! ```
//!
//! The envelope records which recipient key was used (`key_hint`), so the
//! receiver can consume exactly that one-time key from its pool. Once a
//! key is consumed it is never accepted again; compromise of later keys
//! cannot expose earlier messages.
//!
//! # Security
//!
//! - Forward secrecy: each envelope binds to a single one-time key on
//!   both sides; key material is zeroized when handles drop.
//! - Authenticity: XChaCha20-Poly1305 rejects any tampered ciphertext
//!   with [`CryptoError::DecryptionFailed`].
//! - Nonces are 24 random bytes per envelope, never reused with the same
//!   derived key because the key itself is single-use.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod envelope;
mod error;
mod keypair;

pub use envelope::{Envelope, KEY_SIZE, NONCE_SIZE, seal, unseal};
pub use error::CryptoError;
pub use keypair::EphemeralKeyPair;
