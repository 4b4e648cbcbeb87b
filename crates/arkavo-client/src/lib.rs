//! Client side of the Arkavo secure-messaging transport.
//!
//! Three tightly coupled pieces over one wire channel:
//!
//! - [`KasConnection`]: a persistent connection to the Key Access
//!   Service that multiplexes the typed frames of
//!   [`arkavo_proto::MessageType`] and runs the key-rewrap negotiation.
//! - [`StreamRouter`]: demultiplexes inbound ciphertext frames to
//!   per-conversation handlers keyed by a 32-byte [`StreamId`]
//!   (re-exported from `arkavo-proto`).
//! - [`Messenger`]: the P2P facade composing the connection, the router,
//!   and the one-time key store into encrypt-send / receive-decrypt
//!   operations, reporting progress through [`ClientEvent`]s.
//!
//! One [`Messenger`] instance belongs to the process-level session and
//! is handed by reference to each conversation controller; there is no
//! global singleton.

mod connection;
mod error;
mod event;
mod messenger;
mod rewrap;
mod router;
mod transport;

pub use arkavo_proto::{Frame, MessageType, StreamId};
pub use connection::{ConnectionConfig, ConnectionState, KasConfig, KasConnection};
pub use error::ClientError;
pub use event::{ClientEvent, PeerStatus};
pub use messenger::{Messenger, PeerProfile};
pub use router::{StreamHandler, StreamRouter, SubscriptionToken};
pub use transport::{
    ChannelPeer, ChannelReader, ChannelTransport, ChannelWriter, FrameReader, FrameTransport,
    FrameWriter, TransportError, WebSocketReader, WebSocketTransport, WebSocketWriter,
    channel_pair,
};
