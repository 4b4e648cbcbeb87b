//! Error types for sealing operations.

use thiserror::Error;

/// Errors produced by seal/unseal operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Envelope bytes do not match the fixed layout.
    #[error("malformed envelope: expected at least {expected} bytes, got {actual}")]
    MalformedEnvelope {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes actually present.
        actual: usize,
    },

    /// Authentication failed: corrupted payload or wrong recipient key.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// What went wrong, for logs only.
        reason: String,
    },
}
