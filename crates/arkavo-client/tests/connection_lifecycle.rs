//! Connection lifecycle over an in-process transport.

use std::time::Duration;

use arkavo_client::{
    ChannelPeer, ConnectionState, Frame, KasConfig, KasConnection, MessageType, channel_pair,
};
use bytes::Bytes;
use tokio::time::timeout;

fn test_config() -> KasConfig {
    KasConfig::new("ws://kas.test.invalid")
}

async fn recv_frame(peer: &mut ChannelPeer) -> Frame {
    timeout(Duration::from_secs(2), peer.from_client.recv())
        .await
        .expect("frame within deadline")
        .expect("channel open")
}

async fn wait_for_state(connection: &KasConnection, expected: &ConnectionState) {
    let mut rx = connection.subscribe();
    timeout(Duration::from_secs(2), async {
        loop {
            if *rx.borrow_and_update() == *expected {
                return;
            }
            rx.changed().await.expect("state channel open");
        }
    })
    .await
    .expect("state within deadline");
}

#[tokio::test]
async fn connect_announces_public_key_and_reaches_connected() {
    let connection = KasConnection::new(test_config(), [7u8; 32]);
    assert_eq!(connection.state(), ConnectionState::Disconnected);

    let (transport, mut peer) = channel_pair(16);
    connection.connect_with(transport);

    assert_eq!(connection.state(), ConnectionState::Connected);

    let announce = recv_frame(&mut peer).await;
    assert_eq!(announce.message_type(), Some(MessageType::PublicKey));
    assert_eq!(announce.payload.as_ref(), &[7u8; 32]);
}

#[tokio::test]
async fn connect_is_idempotent_while_connected() {
    let connection = KasConnection::new(test_config(), [7u8; 32]);

    let (transport, mut peer) = channel_pair(16);
    connection.connect_with(transport);
    recv_frame(&mut peer).await;

    // A second transport is ignored; no second announcement appears.
    let (transport_b, _peer_b) = channel_pair(16);
    connection.connect_with(transport_b);

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(
        timeout(Duration::from_millis(100), peer.from_client.recv()).await.is_err(),
        "no frame should arrive on the original transport"
    );
}

#[tokio::test]
async fn kas_key_announcement_is_recorded() {
    let connection = KasConnection::new(test_config(), [7u8; 32]);
    let (transport, peer) = channel_pair(16);
    connection.connect_with(transport);

    assert_eq!(connection.kas_public_key(), None);

    peer.to_client
        .send(Frame::new(MessageType::KasPublicKey, vec![9u8; 32]))
        .await
        .expect("peer channel open");

    timeout(Duration::from_secs(2), async {
        while connection.kas_public_key().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("key within deadline");

    assert_eq!(connection.kas_public_key(), Some([9u8; 32]));
}

#[tokio::test]
async fn malformed_kas_key_is_dropped() {
    let connection = KasConnection::new(test_config(), [7u8; 32]);
    let (transport, peer) = channel_pair(16);
    connection.connect_with(transport);

    peer.to_client
        .send(Frame::new(MessageType::KasPublicKey, vec![9u8; 16]))
        .await
        .expect("peer channel open");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(connection.kas_public_key(), None);
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn peer_drop_settles_to_disconnected_with_reason() {
    let connection = KasConnection::new(test_config(), [7u8; 32]);
    let (transport, mut peer) = channel_pair(16);
    connection.connect_with(transport);
    assert_eq!(connection.state(), ConnectionState::Connected);

    // Drain the announcement so the writer is idle; the reader's close
    // notification then decides the recorded reason.
    recv_frame(&mut peer).await;

    drop(peer);
    wait_for_state(&connection, &ConnectionState::Disconnected).await;

    assert_eq!(connection.last_error().as_deref(), Some("connection closed by peer"));
}

#[tokio::test]
async fn reconnect_clears_last_error() {
    let connection = KasConnection::new(test_config(), [7u8; 32]);

    let (transport, peer) = channel_pair(16);
    connection.connect_with(transport);
    drop(peer);
    wait_for_state(&connection, &ConnectionState::Disconnected).await;
    assert!(connection.last_error().is_some());

    let (transport, mut peer) = channel_pair(16);
    connection.connect_with(transport);

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(connection.last_error(), None);
    recv_frame(&mut peer).await;
}

#[tokio::test]
async fn zero_queue_depth_is_clamped() {
    let mut config = test_config();
    config.connect.outbound_queue_depth = 0;

    let connection = KasConnection::new(config, [7u8; 32]);
    let (transport, mut peer) = channel_pair(16);
    connection.connect_with(transport);

    // Connection comes up and the announcement still goes out.
    assert_eq!(connection.state(), ConnectionState::Connected);
    let announce = recv_frame(&mut peer).await;
    assert_eq!(announce.message_type(), Some(MessageType::PublicKey));
}

#[tokio::test]
async fn send_requires_connection() {
    let connection = KasConnection::new(test_config(), [7u8; 32]);

    let result =
        connection.send(Frame::new(MessageType::Message, Bytes::from_static(b"nope"))).await;
    assert!(matches!(result, Err(arkavo_client::ClientError::NotConnected)));
}

#[tokio::test]
async fn unknown_tags_are_dropped_without_killing_connection() {
    let connection = KasConnection::new(test_config(), [7u8; 32]);
    let (transport, peer) = channel_pair(16);
    connection.connect_with(transport);

    peer.to_client.send(Frame { type_tag: 0xEE, payload: Bytes::from_static(b"??") }).await
        .expect("peer channel open");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(connection.state(), ConnectionState::Connected);
}
