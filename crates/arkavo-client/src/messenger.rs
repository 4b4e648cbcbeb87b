//! P2P messaging facade.
//!
//! Composes the service connection, the stream router, and the one-time
//! key store into encrypt-send and receive-decrypt operations. Every
//! outbound message is sealed with a fresh one-time key from the pool;
//! every inbound message consumes the one-time key its envelope names,
//! giving each message forward secrecy.
//!
//! Background outcomes (inbound messages, status changes, key pool
//! health) surface through the [`ClientEvent`] channel handed back by
//! [`Messenger::new`].

use arkavo_crypto::{Envelope, EphemeralKeyPair, seal, unseal};
use arkavo_keys::{IssuedKey, KeyStatistics, KeyStoreError, OneTimeKeyStore};
use arkavo_proto::{Frame, MessageType, StreamId};
use bytes::Bytes;
use rand::rngs::OsRng;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    connection::{ConnectionState, KasConfig, KasConnection},
    error::ClientError,
    event::{ClientEvent, PeerStatus},
    router::SubscriptionToken,
};

/// A known peer for direct (service-bypassing) encryption.
#[derive(Debug, Clone)]
pub struct PeerProfile {
    /// Peer's public key, also its stable identity.
    pub public_id: [u8; 32],
    /// Human-readable name, display only.
    pub display_name: String,
}

/// Session-level messaging handle.
///
/// One instance per process session, handed by reference to each
/// conversation controller. Clone shares the same connection and pool.
#[derive(Clone)]
pub struct Messenger {
    connection: KasConnection,
    keys: OneTimeKeyStore,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl Messenger {
    /// Create a messenger and the event stream it reports through.
    ///
    /// `identity` is the long-term key pair announced to the service on
    /// connect; message sealing always uses fresh one-time keys from
    /// `keys`, never the identity key.
    ///
    /// Must be called within a Tokio runtime: a background task forwards
    /// connection state changes into the event stream.
    #[must_use]
    pub fn new(
        config: KasConfig,
        identity: &EphemeralKeyPair,
        keys: OneTimeKeyStore,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let connection = KasConnection::new(config, identity.public_bytes());
        let (events, events_rx) = mpsc::unbounded_channel();

        let messenger = Self { connection, keys, events };
        messenger.spawn_status_forwarder();

        (messenger, events_rx)
    }

    /// Connect to the Key Access Service.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Transport` if the dial fails.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.connection.connect().await
    }

    /// Tear down the connection and all stream subscriptions.
    pub fn close(&self) {
        self.connection.close();
    }

    /// Seal `content` for the service and send it on `stream`.
    ///
    /// The envelope is sealed against the service's announced public key
    /// with a fresh one-time key as sender. Returns the envelope bytes
    /// as sent, hint included, for local persistence.
    ///
    /// # Errors
    ///
    /// - `ClientError::NotConnected` if the connection is down or the
    ///   service has not announced its key yet.
    /// - `ClientError::KeyStoreExhausted` if no one-time key is
    ///   available even after regenerating.
    pub async fn send_message(
        &self,
        content: &[u8],
        stream: StreamId,
    ) -> Result<Vec<u8>, ClientError> {
        let recipient = self.connection.kas_public_key().ok_or(ClientError::NotConnected)?;
        self.seal_and_send(content, recipient, stream).await
    }

    /// Seal `content` for a specific peer and send it on `stream`.
    ///
    /// Same flow as [`Self::send_message`] with the peer's public key as
    /// recipient; the service relays the envelope without being able to
    /// open it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send_message`], minus the service-key requirement.
    pub async fn send_direct_message(
        &self,
        content: &[u8],
        peer: &PeerProfile,
        stream: StreamId,
    ) -> Result<Vec<u8>, ClientError> {
        self.seal_and_send(content, peer.public_id, stream).await
    }

    /// Open an envelope addressed to this session.
    ///
    /// Consumes the one-time key the envelope names before unsealing;
    /// the same envelope can never be decrypted twice.
    ///
    /// # Errors
    ///
    /// - `ClientError::MalformedFrame` if the bytes do not parse.
    /// - `ClientError::UnknownKey` if the hint names an untracked key.
    /// - `ClientError::KeyAlreadyConsumed` on replay.
    /// - `ClientError::DecryptionFailed` if authentication fails.
    pub fn decrypt_message(&self, envelope_bytes: &[u8]) -> Result<Vec<u8>, ClientError> {
        let envelope = Envelope::from_bytes(envelope_bytes)?;

        let pair = self.keys.consume_key(&envelope.key_hint).inspect_err(|e| {
            if matches!(e, KeyStoreError::AlreadyConsumed) {
                self.emit(ClientEvent::ErrorEncountered(
                    "rejected replayed envelope".to_string(),
                ));
            }
        })?;

        let plaintext = unseal(&envelope, &pair)?;

        self.emit_key_status();
        self.maybe_regenerate();

        Ok(plaintext)
    }

    /// Subscribe to a stream, decrypting each inbound message and
    /// emitting it as [`ClientEvent::MessageReceived`].
    ///
    /// Replaces any existing subscription for the stream. Envelopes that
    /// fail to parse or decrypt are dropped with an
    /// [`ClientEvent::ErrorEncountered`] report; the stream stays
    /// subscribed.
    pub fn join_stream(&self, stream: StreamId) -> SubscriptionToken {
        let handler = {
            let messenger = self.clone();
            move |body: Bytes| messenger.handle_stream_message(stream, &body)
        };

        let token = self.connection.router().subscribe(stream, handler);
        debug!(stream = ?stream, "joined stream");
        token
    }

    /// Unsubscribe from the stream `token` proves. Stale tokens are
    /// inert.
    pub fn leave_stream(&self, token: SubscriptionToken) {
        self.connection.router().unsubscribe(token);
    }

    /// Underlying service connection.
    #[must_use]
    pub fn connection(&self) -> &KasConnection {
        &self.connection
    }

    /// One-time key pool health.
    #[must_use]
    pub fn key_statistics(&self) -> KeyStatistics {
        self.keys.statistics()
    }

    async fn seal_and_send(
        &self,
        content: &[u8],
        recipient: [u8; 32],
        stream: StreamId,
    ) -> Result<Vec<u8>, ClientError> {
        let issued = self.issue_key()?;
        let envelope = seal(content, recipient, issued.keypair(), &mut OsRng);
        let envelope_bytes = envelope.to_bytes();

        let frame = Frame::new(MessageType::Message, stream.prefix_to(&envelope_bytes));
        let sent = self.connection.send(frame).await;

        // The key is spent whether or not the send made it out; the pool
        // check must run on both paths.
        self.emit_key_status();
        self.maybe_regenerate();

        sent?;
        Ok(envelope_bytes)
    }

    /// Issue a one-time key, regenerating and retrying once on an
    /// exhausted pool.
    fn issue_key(&self) -> Result<IssuedKey, ClientError> {
        match self.keys.issue_key() {
            Ok(key) => Ok(key),
            Err(KeyStoreError::Exhausted) => {
                warn!("key pool exhausted, regenerating");
                self.keys.regenerate().map_err(ClientError::from)?;

                self.keys.issue_key().map_err(|e| {
                    self.emit(ClientEvent::ErrorEncountered(
                        "key pool exhausted after regeneration".to_string(),
                    ));
                    ClientError::from(e)
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn handle_stream_message(&self, stream: StreamId, body: &Bytes) {
        let envelope = match Envelope::from_bytes(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(stream = ?stream, error = %e, "dropping unparseable envelope");
                self.emit(ClientEvent::ErrorEncountered(format!("malformed envelope: {e}")));
                return;
            }
        };

        let sender = envelope.sender_public;
        match self.decrypt_parsed(&envelope) {
            Ok(plaintext) => {
                self.emit(ClientEvent::MessageReceived {
                    stream_id: stream,
                    payload: Bytes::from(plaintext),
                    sender,
                });
            }
            Err(e) => {
                warn!(stream = ?stream, error = %e, "dropping undecryptable envelope");
                self.emit(ClientEvent::ErrorEncountered(format!("inbound decrypt: {e}")));
            }
        }
    }

    fn decrypt_parsed(&self, envelope: &Envelope) -> Result<Vec<u8>, ClientError> {
        let pair = self.keys.consume_key(&envelope.key_hint)?;
        let plaintext = unseal(envelope, &pair)?;

        self.emit_key_status();
        self.maybe_regenerate();

        Ok(plaintext)
    }

    /// Top the pool back up when it crosses the low-water mark.
    fn maybe_regenerate(&self) {
        if !self.keys.needs_regeneration() {
            return;
        }

        match self.keys.regenerate() {
            Ok(generated) => {
                debug!(generated, "regenerated one-time keys");
                self.emit_key_status();
            }
            Err(e) => {
                warn!(error = %e, "key regeneration failed");
                self.emit(ClientEvent::ErrorEncountered(format!("key regeneration: {e}")));
            }
        }
    }

    fn emit(&self, event: ClientEvent) {
        // The embedder may have dropped the receiver; events are
        // best-effort.
        let _ = self.events.send(event);
    }

    fn emit_key_status(&self) {
        let stats = self.keys.statistics();
        self.emit(ClientEvent::KeyStatusChanged {
            available: stats.available,
            capacity: stats.capacity,
        });
    }

    fn spawn_status_forwarder(&self) {
        let mut state_rx = self.connection.subscribe();
        let connection = self.connection.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            loop {
                let status = match state_rx.borrow_and_update().clone() {
                    ConnectionState::Disconnected => PeerStatus::Disconnected,
                    ConnectionState::Connecting => PeerStatus::Connecting,
                    ConnectionState::Connected => {
                        PeerStatus::Connected(connection.router().handler_count())
                    }
                    ConnectionState::Failed(reason) => PeerStatus::Failed(reason),
                };

                if events.send(ClientEvent::ConnectionStatusChanged(status)).is_err() {
                    break;
                }
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        });
    }
}
