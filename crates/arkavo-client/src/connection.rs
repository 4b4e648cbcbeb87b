//! Persistent connection to the Key Access Service.
//!
//! One connection multiplexes every typed frame of the protocol: the
//! public-key handshake, rewrap negotiations, and stream-addressed
//! message traffic. Reads and writes run on dedicated tasks bridged by
//! channels; callers interact through cheap clonable handles.
//!
//! # State machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected
//!                     |
//!                     v (dial failure)
//!                  Failed -> Disconnected
//! ```
//!
//! `Failed` is published momentarily so status watchers can observe the
//! failure, then settles to `Disconnected`; the failure reason stays
//! available through [`KasConnection::last_error`] until the next
//! successful connect.

#![allow(clippy::expect_used, reason = "Mutex poisoning should cause a panic")]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use arkavo_proto::{Frame, MessageType, RewrapRequest, RewrappedKey};
use bytes::Bytes;
use tokio::{
    sync::{mpsc, watch},
    task::AbortHandle,
};
use tracing::{debug, info, warn};

use crate::{
    error::ClientError,
    rewrap::PendingRewraps,
    router::StreamRouter,
    transport::{FrameReader, FrameTransport, FrameWriter, WebSocketTransport},
};

/// Connection lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none in progress.
    Disconnected,
    /// Dial or handshake in progress.
    Connecting,
    /// Frames are flowing.
    Connected,
    /// The last attempt failed; settles to `Disconnected`.
    Failed(String),
}

/// Tuning knobs for an established connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    /// Outbound frame queue depth before senders back-pressure.
    pub outbound_queue_depth: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { outbound_queue_depth: 64 }
    }
}

/// Where and how to reach the Key Access Service.
#[derive(Debug, Clone)]
pub struct KasConfig {
    /// WebSocket URL, e.g. `wss://kas.arkavo.net`.
    pub url: String,
    /// Bearer token for the upgrade request, if the service requires one.
    pub auth_token: Option<String>,
    /// Per-connection tuning.
    pub connect: ConnectionConfig,
}

impl KasConfig {
    /// Config with default tuning for `url`, no auth.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), auth_token: None, connect: ConnectionConfig::default() }
    }
}

struct IoHandles {
    outbound: mpsc::Sender<Frame>,
    writer: AbortHandle,
    reader: AbortHandle,
}

struct ConnectionShared {
    state: watch::Sender<ConnectionState>,
    last_error: Mutex<Option<String>>,
    kas_public_key: Mutex<Option<[u8; 32]>>,
    pending: PendingRewraps,
    router: StreamRouter,
    io: Mutex<Option<IoHandles>>,
    local_public_key: [u8; 32],
    connect: ConnectionConfig,
    /// Bumped on every teardown; a dial started under an older value
    /// must discard its transport instead of establishing.
    generation: AtomicU64,
}

/// Handle to a Key Access Service connection.
///
/// Clone shares the same underlying connection.
#[derive(Clone)]
pub struct KasConnection {
    config: KasConfig,
    shared: Arc<ConnectionShared>,
}

impl KasConnection {
    /// Create a disconnected handle.
    ///
    /// `local_public_key` is announced to the service as the first frame
    /// of every established connection.
    #[must_use]
    pub fn new(config: KasConfig, local_public_key: [u8; 32]) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let connect = config.connect;

        Self {
            config,
            shared: Arc::new(ConnectionShared {
                state,
                last_error: Mutex::new(None),
                kas_public_key: Mutex::new(None),
                pending: PendingRewraps::new(),
                router: StreamRouter::new(),
                io: Mutex::new(None),
                local_public_key,
                connect,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Dial the configured service and start frame processing.
    ///
    /// Idempotent: a call while already `Connecting` or `Connected`
    /// returns immediately without a second dial.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the dial or handshake fails.
    /// The failure reason is also retained for [`Self::last_error`].
    pub async fn connect(&self) -> Result<(), ClientError> {
        let Some(claimed) = self.shared.begin_connect() else {
            return Ok(());
        };

        match WebSocketTransport::dial(&self.config).await {
            Ok(transport) => {
                ConnectionShared::establish(&self.shared, transport, claimed);
                Ok(())
            }
            Err(e) => {
                self.shared.fail_connect(&e.to_string());
                Err(ClientError::Transport(e.to_string()))
            }
        }
    }

    /// Start frame processing over an already-established transport.
    ///
    /// Same lifecycle as [`Self::connect`] minus the dial; the seam
    /// integration tests drive connections through this with in-process
    /// channel transports.
    pub fn connect_with<T: FrameTransport>(&self, transport: T) {
        let Some(claimed) = self.shared.begin_connect() else {
            return;
        };
        ConnectionShared::establish(&self.shared, transport, claimed);
    }

    /// Queue a frame for transmission.
    ///
    /// # Errors
    ///
    /// - `ClientError::NotConnected` if no connection is established.
    /// - `ClientError::ConnectionClosed` if the connection died while
    ///   the frame was queued.
    pub async fn send(&self, frame: Frame) -> Result<(), ClientError> {
        let outbound = self
            .shared
            .io
            .lock()
            .expect("io lock")
            .as_ref()
            .map(|io| io.outbound.clone())
            .ok_or(ClientError::NotConnected)?;

        outbound.send(frame).await.map_err(|_| ClientError::ConnectionClosed)
    }

    /// Announce a public key to the service.
    ///
    /// The local key is announced automatically on connect; this covers
    /// rotations and additional device keys.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send`].
    pub async fn send_public_key(&self, key: &[u8; 32]) -> Result<(), ClientError> {
        self.send(Frame::new(MessageType::PublicKey, Bytes::copy_from_slice(key))).await
    }

    /// Run a rewrap negotiation for `header` and await the rewrapped key.
    ///
    /// Concurrent calls with an identical header share one negotiation:
    /// only the first puts a request on the wire, and the single
    /// response settles every caller. Callers own their timeout; wrap
    /// this in [`tokio::time::timeout`] as needed.
    ///
    /// # Errors
    ///
    /// - `ClientError::NotConnected` if no connection is established.
    /// - `ClientError::ConnectionClosed` if the connection dies before
    ///   the response arrives.
    pub async fn rewrap(&self, header: Bytes) -> Result<Bytes, ClientError> {
        let request = RewrapRequest { header };
        let id = request.request_id();

        let (rx, is_first) = self.shared.pending.register(id);

        if is_first {
            if let Err(e) = self.send(request.into_frame()).await {
                self.shared.pending.fail(id);
                return Err(e);
            }
        }

        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Tear down the connection and drop every stream subscription.
    ///
    /// Outstanding rewrap negotiations settle with `ConnectionClosed`.
    pub fn close(&self) {
        self.shared.teardown("closed by client");
        self.shared.router.clear();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    /// Watch lifecycle state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Reason for the most recent disconnect or dial failure, cleared on
    /// the next successful connect.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().expect("last error lock").clone()
    }

    /// The service's announced public key, once received.
    #[must_use]
    pub fn kas_public_key(&self) -> Option<[u8; 32]> {
        *self.shared.kas_public_key.lock().expect("kas key lock")
    }

    /// The stream router demultiplexing this connection's messages.
    #[must_use]
    pub fn router(&self) -> &StreamRouter {
        &self.shared.router
    }

    /// Public key announced to the service on connect.
    #[must_use]
    pub fn local_public_key(&self) -> [u8; 32] {
        self.shared.local_public_key
    }
}

impl ConnectionShared {
    /// Claim the `Connecting` slot, returning the generation the claim
    /// belongs to. `None` when a connection is already in progress or
    /// established.
    fn begin_connect(&self) -> Option<u64> {
        // Serialize against teardown so the claimed generation cannot
        // be stale the instant it is read.
        let _io = self.io.lock().expect("io lock");

        let claimed = self.state.send_if_modified(|state| match state {
            ConnectionState::Connecting | ConnectionState::Connected => false,
            ConnectionState::Disconnected | ConnectionState::Failed(_) => {
                *state = ConnectionState::Connecting;
                true
            }
        });

        claimed.then(|| self.generation.load(Ordering::Acquire))
    }

    fn fail_connect(&self, reason: &str) {
        warn!(reason, "connection attempt failed");
        *self.last_error.lock().expect("last error lock") = Some(reason.to_string());
        self.state.send_replace(ConnectionState::Failed(reason.to_string()));
        self.state.send_replace(ConnectionState::Disconnected);
    }

    fn establish<T: FrameTransport>(shared: &Arc<Self>, transport: T, claimed: u64) {
        let mut io_slot = shared.io.lock().expect("io lock");

        // Torn down while the dial was in flight; the close wins.
        if shared.generation.load(Ordering::Acquire) != claimed {
            debug!("discarding transport established after close");
            return;
        }

        let (writer, reader) = transport.split();
        let (outbound, outbound_rx) = mpsc::channel(shared.connect.outbound_queue_depth.max(1));

        // First frame on every connection: announce our public key.
        let announce =
            Frame::new(MessageType::PublicKey, Bytes::copy_from_slice(&shared.local_public_key));
        if outbound.try_send(announce).is_err() {
            warn!("failed to queue public key announcement");
        }

        let writer_task = tokio::spawn(Self::run_writer(Arc::clone(shared), writer, outbound_rx));
        let reader_task = tokio::spawn(Self::run_reader(Arc::clone(shared), reader));

        *io_slot = Some(IoHandles {
            outbound,
            writer: writer_task.abort_handle(),
            reader: reader_task.abort_handle(),
        });
        drop(io_slot);

        *shared.last_error.lock().expect("last error lock") = None;
        shared.state.send_replace(ConnectionState::Connected);

        info!("connection established");
    }

    async fn run_writer<W: FrameWriter>(
        shared: Arc<Self>,
        mut writer: W,
        mut outbound: mpsc::Receiver<Frame>,
    ) {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = writer.write(frame).await {
                shared.teardown(&format!("write failed: {e}"));
                break;
            }
        }
    }

    async fn run_reader<R: FrameReader>(shared: Arc<Self>, mut reader: R) {
        loop {
            match reader.read().await {
                Ok(Some(frame)) => shared.handle_inbound(frame),
                Ok(None) => {
                    shared.teardown("connection closed by peer");
                    break;
                }
                Err(e) => {
                    shared.teardown(&format!("read failed: {e}"));
                    break;
                }
            }
        }
    }

    fn handle_inbound(&self, frame: Frame) {
        match frame.message_type() {
            Some(MessageType::KasPublicKey) => {
                if frame.payload.len() == 32 {
                    let mut key = [0u8; 32];
                    key.copy_from_slice(&frame.payload);
                    *self.kas_public_key.lock().expect("kas key lock") = Some(key);
                    debug!("received service public key");
                } else {
                    warn!(len = frame.payload.len(), "dropping malformed service key announcement");
                }
            }
            Some(MessageType::RewrappedKey) => match RewrappedKey::from_payload(&frame.payload) {
                Ok(response) => self.pending.resolve(response.request_id, &response.key),
                Err(e) => warn!(error = %e, "dropping malformed rewrap response"),
            },
            Some(MessageType::Message) => self.router.route(&frame.payload),
            Some(MessageType::PublicKey | MessageType::RewrapRequest) => {
                debug!(tag = frame.type_tag, "dropping unexpected client-bound frame");
            }
            None => {
                debug!(tag = frame.type_tag, "dropping frame with unknown tag");
            }
        }
    }

    /// Tear down the live connection, if any. Safe to call repeatedly.
    ///
    /// Also settles a dial that is still in flight: the generation bump
    /// makes `establish` discard the transport when it finally arrives.
    fn teardown(&self, reason: &str) {
        let mut io_slot = self.io.lock().expect("io lock");
        self.generation.fetch_add(1, Ordering::AcqRel);

        match io_slot.take() {
            Some(io) => {
                io.writer.abort();
                io.reader.abort();
            }
            // No I/O established. Nothing to do unless a dial is in
            // flight, which must still settle to Disconnected.
            None if *self.state.borrow() != ConnectionState::Connecting => return,
            None => {}
        }
        drop(io_slot);

        self.pending.fail_all();
        *self.last_error.lock().expect("last error lock") = Some(reason.to_string());
        self.state.send_replace(ConnectionState::Disconnected);

        info!(reason, "disconnected");
    }
}
