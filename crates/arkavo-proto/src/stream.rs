//! Stream identifiers and stream-addressed payload parsing.
//!
//! Conversations are named by a fixed 32-byte public identifier. A
//! [`MessageType::Message`](crate::MessageType::Message) frame embeds the
//! identifier at the start of its payload so the router can demultiplex
//! without parsing the remaining bytes.

use std::fmt;

use bytes::Bytes;

use crate::errors::{ProtocolError, Result};

/// Width of a stream identifier in bytes.
pub const STREAM_ID_SIZE: usize = 32;

/// Fixed 32-byte identifier naming a conversation/channel.
///
/// Never reused across distinct conversations; used verbatim as the
/// router's demultiplexing key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId([u8; STREAM_ID_SIZE]);

impl StreamId {
    /// Wrap raw identifier bytes.
    #[must_use]
    pub fn new(bytes: [u8; STREAM_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Identifier bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; STREAM_ID_SIZE] {
        &self.0
    }

    /// Parse an identifier from the front of a payload, returning the
    /// identifier and the remaining bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than 32 bytes are
    ///   available.
    pub fn split_from(payload: &Bytes) -> Result<(Self, Bytes)> {
        if payload.len() < STREAM_ID_SIZE {
            return Err(ProtocolError::FrameTooShort {
                expected: STREAM_ID_SIZE,
                actual: payload.len(),
            });
        }

        let mut id = [0u8; STREAM_ID_SIZE];
        id.copy_from_slice(&payload[..STREAM_ID_SIZE]);

        Ok((Self(id), payload.slice(STREAM_ID_SIZE..)))
    }

    /// Build a stream-addressed payload: identifier followed by content.
    #[must_use]
    pub fn prefix_to(&self, content: &[u8]) -> Vec<u8> {
        let mut payload = Vec::with_capacity(STREAM_ID_SIZE + content.len());
        payload.extend_from_slice(&self.0);
        payload.extend_from_slice(content);
        payload
    }
}

impl From<[u8; STREAM_ID_SIZE]> for StreamId {
    fn from(bytes: [u8; STREAM_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamId(")?;
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "..)")
    }
}
