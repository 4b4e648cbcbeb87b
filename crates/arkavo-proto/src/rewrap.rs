//! Rewrap request/response payloads.
//!
//! A rewrap negotiation sends a sealed header to the Key Access Service
//! and waits for the rewrapped key. Both sides derive the correlation id
//! as the SHA-256 of the header bytes, so the response payload only has
//! to carry the id and the wrapped key:
//!
//! ```text
//! RewrapRequest payload:  [header: N bytes]
//! RewrappedKey payload:   [request id: 32 bytes][wrapped key: N bytes]
//! ```

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::{
    errors::{ProtocolError, Result},
    frame::{Frame, MessageType},
};

/// Width of a rewrap correlation id in bytes.
pub const REWRAP_ID_SIZE: usize = 32;

/// Correlation id for a rewrap negotiation: SHA-256 over the sealed
/// header bytes. Duplicate requests for the same header hash to the
/// same id and must share one outstanding negotiation.
#[must_use]
pub fn rewrap_request_id(header: &[u8]) -> [u8; REWRAP_ID_SIZE] {
    Sha256::digest(header).into()
}

/// Outbound rewrap request: the sealed header, sent verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrapRequest {
    /// Sealed header whose key should be rewrapped.
    pub header: Bytes,
}

impl RewrapRequest {
    /// Correlation id this request will be answered under.
    #[must_use]
    pub fn request_id(&self) -> [u8; REWRAP_ID_SIZE] {
        rewrap_request_id(&self.header)
    }

    /// Build the wire frame for this request.
    #[must_use]
    pub fn into_frame(self) -> Frame {
        Frame::new(MessageType::RewrapRequest, self.header)
    }
}

/// Inbound rewrap response: correlation id plus the wrapped key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrappedKey {
    /// SHA-256 of the header the service rewrapped.
    pub request_id: [u8; REWRAP_ID_SIZE],
    /// Wrapped key material, opaque to this layer.
    pub key: Bytes,
}

impl RewrappedKey {
    /// Parse a `RewrappedKey` frame payload.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if the payload is shorter than
    ///   the 32-byte correlation id.
    pub fn from_payload(payload: &Bytes) -> Result<Self> {
        if payload.len() < REWRAP_ID_SIZE {
            return Err(ProtocolError::FrameTooShort {
                expected: REWRAP_ID_SIZE,
                actual: payload.len(),
            });
        }

        let mut request_id = [0u8; REWRAP_ID_SIZE];
        request_id.copy_from_slice(&payload[..REWRAP_ID_SIZE]);

        Ok(Self { request_id, key: payload.slice(REWRAP_ID_SIZE..) })
    }

    /// Build the wire frame for this response.
    #[must_use]
    pub fn into_frame(self) -> Frame {
        let mut payload = Vec::with_capacity(REWRAP_ID_SIZE + self.key.len());
        payload.extend_from_slice(&self.request_id);
        payload.extend_from_slice(&self.key);
        Frame::new(MessageType::RewrappedKey, payload)
    }
}
