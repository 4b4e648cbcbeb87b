//! One-time key lifecycle management.
//!
//! Owns a pool of ephemeral X25519 key pairs that give each message
//! forward secrecy: a key is issued for exactly one outbound seal or
//! consumed for exactly one inbound unseal, and is never used again.
//! The pool regenerates itself when the available count drops below a
//! configurable low-water mark, and every mutation is written through to
//! a durable store.
//!
//! # Durability
//!
//! The persisted pool (private key material included) is the only copy
//! of the keys. Losing the store mid-conversation makes every message
//! sealed against the lost keys permanently undecryptable - that is the
//! accepted cost of forward secrecy, and nothing here masks it.
//! Consumed keys stay in the store so replayed envelopes are still
//! rejected after a restart.

mod error;
mod pool;
mod storage;

pub use error::KeyStoreError;
pub use pool::{IssuedKey, KeyPoolConfig, KeyStatistics, OneTimeKeyStore};
pub use storage::{KeyStorage, MemoryKeyStorage, RedbKeyStorage, StorageError, StoredKeyRecord};
