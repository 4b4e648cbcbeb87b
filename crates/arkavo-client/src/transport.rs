//! Frame transport seam.
//!
//! [`KasConnection`](crate::KasConnection) talks to the wire through the
//! [`FrameTransport`] trait so tests can substitute an in-process channel
//! pair for the production WebSocket. Both sides of the seam speak
//! [`Frame`]s; encoding to wire bytes happens inside the transport.

use arkavo_proto::Frame;
use async_trait::async_trait;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, client::IntoClientRequest, http::header::AUTHORIZATION},
};
use tracing::{debug, warn};

use crate::connection::KasConfig;

/// Errors produced by the transport layer.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to establish the underlying connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The established stream failed mid-flight.
    #[error("stream error: {0}")]
    Stream(String),

    /// The handshake request could not be constructed.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A bidirectional frame channel that can be split into independent
/// read and write halves.
pub trait FrameTransport: Send + 'static {
    /// Write half type.
    type Writer: FrameWriter;
    /// Read half type.
    type Reader: FrameReader;

    /// Split into write and read halves for independent tasks.
    fn split(self) -> (Self::Writer, Self::Reader);
}

/// Outbound half of a frame transport.
#[async_trait]
pub trait FrameWriter: Send + 'static {
    /// Send one frame.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Stream` when the channel is gone.
    async fn write(&mut self, frame: Frame) -> Result<(), TransportError>;
}

/// Inbound half of a frame transport.
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// Receive the next frame. `Ok(None)` means the peer closed cleanly.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Stream` on an abnormal stream failure.
    async fn read(&mut self) -> Result<Option<Frame>, TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production transport: binary frames over a WebSocket connection.
pub struct WebSocketTransport {
    stream: WsStream,
}

impl WebSocketTransport {
    /// Dial the Key Access Service described by `config`.
    ///
    /// The auth token, when present, rides in the `Authorization` header
    /// of the upgrade request as a bearer credential.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Protocol` if the URL does not form a
    /// valid upgrade request, or `TransportError::Connection` if the
    /// dial or handshake fails.
    pub async fn dial(config: &KasConfig) -> Result<Self, TransportError> {
        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        if let Some(token) = &config.auth_token {
            let value = format!("Bearer {token}")
                .parse()
                .map_err(|_| TransportError::Protocol("invalid auth token".to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        debug!(status = %response.status(), url = %config.url, "websocket established");

        Ok(Self { stream })
    }
}

impl FrameTransport for WebSocketTransport {
    type Writer = WebSocketWriter;
    type Reader = WebSocketReader;

    fn split(self) -> (Self::Writer, Self::Reader) {
        let (sink, stream) = self.stream.split();
        (WebSocketWriter { sink }, WebSocketReader { stream })
    }
}

/// Write half of [`WebSocketTransport`].
pub struct WebSocketWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameWriter for WebSocketWriter {
    async fn write(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.sink
            .send(Message::Binary(frame.encode()))
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))
    }
}

/// Read half of [`WebSocketTransport`].
pub struct WebSocketReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReader for WebSocketReader {
    async fn read(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let Some(message) = self.stream.next().await else {
                return Ok(None);
            };

            match message.map_err(|e| TransportError::Stream(e.to_string()))? {
                Message::Binary(data) => match Frame::decode(&data) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => {
                        // Keep the connection alive; a single bad frame
                        // is the sender's problem.
                        warn!(error = %e, "dropping undecodable frame");
                    }
                },
                Message::Close(_) => return Ok(None),
                // Tungstenite answers pings internally.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Text(_) => {
                    debug!("ignoring text frame on binary protocol");
                }
                Message::Frame(_) => {}
            }
        }
    }
}

/// Create a connected in-process transport pair for tests.
///
/// The [`ChannelTransport`] plugs into a connection under test; the
/// [`ChannelPeer`] lets the test act as the remote service.
#[must_use]
pub fn channel_pair(capacity: usize) -> (ChannelTransport, ChannelPeer) {
    let (to_client_tx, to_client_rx) = mpsc::channel(capacity);
    let (from_client_tx, from_client_rx) = mpsc::channel(capacity);

    let transport = ChannelTransport { outbound: from_client_tx, inbound: to_client_rx };
    let peer = ChannelPeer { to_client: to_client_tx, from_client: from_client_rx };

    (transport, peer)
}

/// In-process transport backed by bounded channels.
pub struct ChannelTransport {
    outbound: mpsc::Sender<Frame>,
    inbound: mpsc::Receiver<Frame>,
}

impl FrameTransport for ChannelTransport {
    type Writer = ChannelWriter;
    type Reader = ChannelReader;

    fn split(self) -> (Self::Writer, Self::Reader) {
        (ChannelWriter { outbound: self.outbound }, ChannelReader { inbound: self.inbound })
    }
}

/// Write half of [`ChannelTransport`].
pub struct ChannelWriter {
    outbound: mpsc::Sender<Frame>,
}

#[async_trait]
impl FrameWriter for ChannelWriter {
    async fn write(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::Stream("peer receiver dropped".to_string()))
    }
}

/// Read half of [`ChannelTransport`].
pub struct ChannelReader {
    inbound: mpsc::Receiver<Frame>,
}

#[async_trait]
impl FrameReader for ChannelReader {
    async fn read(&mut self) -> Result<Option<Frame>, TransportError> {
        Ok(self.inbound.recv().await)
    }
}

/// Remote end of a [`ChannelTransport`], driven by tests.
pub struct ChannelPeer {
    /// Frames pushed here arrive at the client as inbound traffic.
    pub to_client: mpsc::Sender<Frame>,
    /// Frames the client sent.
    pub from_client: mpsc::Receiver<Frame>,
}
