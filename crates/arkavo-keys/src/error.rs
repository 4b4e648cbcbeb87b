//! Error types for one-time key management.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors produced by the one-time key store.
#[derive(Error, Debug)]
pub enum KeyStoreError {
    /// No available key remains in the pool.
    ///
    /// Recoverable: trigger a regeneration pass and retry once before
    /// treating it as a failure.
    #[error("key store exhausted: no available one-time keys")]
    Exhausted,

    /// The hint does not correspond to any tracked key.
    #[error("unknown key: hint does not match a tracked key")]
    UnknownKey,

    /// The hinted key was already consumed.
    ///
    /// Security-relevant: a second consumption attempt means a replayed
    /// or duplicated envelope. Always surfaced, never retried.
    #[error("key already consumed: possible replay")]
    AlreadyConsumed,

    /// Underlying durable store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
