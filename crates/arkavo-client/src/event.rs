//! Events the messaging layer reports to its embedder.

use arkavo_proto::StreamId;
use bytes::Bytes;

/// High-level connection status as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerStatus {
    /// Connected; carries the number of active stream subscriptions.
    Connected(usize),
    /// Connection attempt in progress.
    Connecting,
    /// No connection.
    Disconnected,
    /// The last connection attempt failed.
    Failed(String),
}

/// Asynchronous notifications emitted by [`Messenger`](crate::Messenger).
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A message arrived on a subscribed stream and was decrypted.
    MessageReceived {
        /// Stream the message arrived on.
        stream_id: StreamId,
        /// Decrypted message content.
        payload: Bytes,
        /// Sender's ephemeral public key from the envelope.
        sender: [u8; 32],
    },
    /// Connection status changed.
    ConnectionStatusChanged(PeerStatus),
    /// One-time key availability changed.
    KeyStatusChanged {
        /// Unconsumed keys remaining.
        available: usize,
        /// Configured pool capacity.
        capacity: usize,
    },
    /// A recoverable error occurred on a background path.
    ErrorEncountered(String),
}
