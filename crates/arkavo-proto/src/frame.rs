//! Frame type: one type byte plus an opaque payload.
//!
//! This is a pure data holder. The codec performs no transformation
//! beyond prepending/stripping the tag, so `decode(encode(t, p))`
//! round-trips for every tag value and every payload, empty included.

use bytes::Bytes;

use crate::errors::{ProtocolError, Result};

/// Known frame type tags.
///
/// The wire reserves one byte for the tag; values outside this enum are
/// carried through [`Frame`] untouched so an old client keeps working
/// against a newer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Client announces its long-term public key after connecting.
    PublicKey = 0x01,
    /// Key Access Service announces its own public key.
    KasPublicKey = 0x02,
    /// Client asks the service to rewrap a sealed header's key.
    RewrapRequest = 0x03,
    /// Service response carrying the rewrapped key.
    RewrappedKey = 0x04,
    /// Stream-addressed application payload.
    Message = 0x05,
}

impl MessageType {
    /// Parse a raw tag byte. `None` for unrecognized tags.
    #[must_use]
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::PublicKey),
            0x02 => Some(Self::KasPublicKey),
            0x03 => Some(Self::RewrapRequest),
            0x04 => Some(Self::RewrappedKey),
            0x05 => Some(Self::Message),
            _ => None,
        }
    }

    /// Raw tag byte for this type.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// A complete wire frame.
///
/// Layout on the wire: `[type_tag: 1 byte] + [payload: variable]`.
///
/// The tag is stored raw rather than as [`MessageType`] so frames with
/// unknown tags survive decoding; dropping them is a routing decision,
/// not a codec failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Raw type tag byte.
    pub type_tag: u8,
    /// Opaque payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame for a known message type.
    #[must_use]
    pub fn new(message_type: MessageType, payload: impl Into<Bytes>) -> Self {
        Self { type_tag: message_type.to_u8(), payload: payload.into() }
    }

    /// Type tag as enum. `None` if unrecognized.
    #[must_use]
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.type_tag)
    }

    /// Encode into wire bytes: tag byte followed by payload verbatim.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(1 + self.payload.len());
        wire.push(self.type_tag);
        wire.extend_from_slice(&self.payload);
        wire
    }

    /// Decode from wire bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedFrame` if `bytes` is empty.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (&type_tag, payload) = bytes.split_first().ok_or(ProtocolError::MalformedFrame)?;

        Ok(Self { type_tag, payload: Bytes::copy_from_slice(payload) })
    }
}
