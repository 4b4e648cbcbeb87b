//! Error taxonomy for the client layer.
//!
//! Strongly-typed errors spanning the connection, the key pool, and the
//! sealing primitives, with `From` conversions at each crate boundary.
//! Malformed or unroutable inbound frames never surface here - the
//! inbound path logs and drops them so the connection stays alive.

use arkavo_crypto::CryptoError;
use arkavo_keys::KeyStoreError;
use arkavo_proto::ProtocolError;
use thiserror::Error;

/// Errors returned by client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Operation requires a connected channel.
    #[error("not connected to the key access service")]
    NotConnected,

    /// The connection was torn down while the operation was pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// Wire bytes or envelope bytes did not parse.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// No one-time key available, even after a regeneration attempt.
    #[error("one-time key store exhausted")]
    KeyStoreExhausted,

    /// Envelope names a key this store has never tracked.
    #[error("unknown one-time key")]
    UnknownKey,

    /// Envelope names a key that was already consumed - potential
    /// replay, always surfaced.
    #[error("one-time key already consumed: possible replay")]
    KeyAlreadyConsumed,

    /// Unsealing failed despite a valid key (corrupted payload or
    /// wrong recipient).
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// What went wrong, for logs only.
        reason: String,
    },

    /// Durable key storage failed.
    #[error("key storage error: {0}")]
    Storage(String),

    /// Underlying transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        Self::MalformedFrame(err.to_string())
    }
}

impl From<KeyStoreError> for ClientError {
    fn from(err: KeyStoreError) -> Self {
        match err {
            KeyStoreError::Exhausted => Self::KeyStoreExhausted,
            KeyStoreError::UnknownKey => Self::UnknownKey,
            KeyStoreError::AlreadyConsumed => Self::KeyAlreadyConsumed,
            KeyStoreError::Storage(e) => Self::Storage(e.to_string()),
        }
    }
}

impl From<CryptoError> for ClientError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MalformedEnvelope { .. } => Self::MalformedFrame(err.to_string()),
            CryptoError::DecryptionFailed { reason } => Self::DecryptionFailed { reason },
        }
    }
}
