//! Storage abstraction for the one-time key pool.
//!
//! Trait-based abstraction over a durable key-value store. The trait is
//! synchronous (no async) so the pool can mutate state and persist it
//! under one lock, which is what keeps issue/consume atomic across
//! threads and processes.

mod error;
mod memory;
mod redb;

pub use error::StorageError;
pub use memory::MemoryKeyStorage;
use serde::{Deserialize, Serialize};

pub use self::redb::RedbKeyStorage;

/// A one-time key record as persisted.
///
/// Contains private key material; the store holding these records is
/// the single durable copy of the pool and must live under exclusive
/// access (redb's file lock in production).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKeyRecord {
    /// X25519 public key, also the record's identity.
    pub public: [u8; 32],
    /// X25519 secret key.
    pub secret: [u8; 32],
    /// Whether the key has been used (issue or consume).
    pub consumed: bool,
    /// Unix seconds at generation time, for oldest-first issuance.
    pub created_at: u64,
}

/// Storage abstraction for one-time key records.
///
/// Implementations are shared via `Arc<dyn KeyStorage>` so one pool and
/// its clones write through to the same store. Writes must be durable
/// before returning: a key marked consumed on disk must never come back
/// as available.
pub trait KeyStorage: Send + Sync + 'static {
    /// Insert or overwrite a record keyed by its public bytes.
    fn put(&self, record: &StoredKeyRecord) -> Result<(), StorageError>;

    /// Load every record in the store. Order is not guaranteed.
    fn load_all(&self) -> Result<Vec<StoredKeyRecord>, StorageError>;
}
