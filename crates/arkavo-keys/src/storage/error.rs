//! Storage error type.

use thiserror::Error;

/// Errors from the durable key store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Underlying I/O or database failure.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Record could not be serialized or deserialized.
    #[error("storage serialization error: {0}")]
    Serialization(String),
}
