//! Rewrap request/response correlation over an in-process transport.

use std::time::Duration;

use arkavo_client::{ChannelPeer, ClientError, Frame, KasConfig, KasConnection, MessageType, channel_pair};
use arkavo_proto::{RewrappedKey, rewrap_request_id};
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

/// Connect and swallow the public key announcement.
async fn connected() -> (KasConnection, ChannelPeer) {
    let connection = KasConnection::new(test_config(), [7u8; 32]);
    let (transport, mut peer) = channel_pair(16);
    connection.connect_with(transport);
    let announce = recv_frame(&mut peer).await;
    assert_eq!(announce.message_type(), Some(MessageType::PublicKey));
    (connection, peer)
}

#[tokio::test]
async fn rewrap_round_trip() {
    let (connection, mut peer) = connected().await;
    let header = Bytes::from_static(b"sealed header bytes");

    let pending = tokio::spawn({
        let connection = connection.clone();
        let header = header.clone();
        async move { connection.rewrap(header).await }
    });

    let request = recv_frame(&mut peer).await;
    assert_eq!(request.message_type(), Some(MessageType::RewrapRequest));
    assert_eq!(request.payload, header);

    let response = RewrappedKey {
        request_id: rewrap_request_id(&header),
        key: Bytes::from_static(b"rewrapped key"),
    };
    peer.to_client.send(response.into_frame()).await.expect("peer channel open");

    let key = pending.await.expect("task").expect("rewrap resolves");
    assert_eq!(key, Bytes::from_static(b"rewrapped key"));
}

#[tokio::test]
async fn duplicate_headers_share_one_wire_request() {
    let (connection, mut peer) = connected().await;
    let header = Bytes::from_static(b"same header");

    let first = tokio::spawn({
        let connection = connection.clone();
        let header = header.clone();
        async move { connection.rewrap(header).await }
    });
    let second = tokio::spawn({
        let connection = connection.clone();
        let header = header.clone();
        async move { connection.rewrap(header).await }
    });

    let request = recv_frame(&mut peer).await;
    assert_eq!(request.message_type(), Some(MessageType::RewrapRequest));

    // One response settles both callers; no second request appears.
    let response =
        RewrappedKey { request_id: rewrap_request_id(&header), key: Bytes::from_static(b"key") };
    peer.to_client.send(response.into_frame()).await.expect("peer channel open");

    assert_eq!(first.await.expect("task").expect("resolves"), Bytes::from_static(b"key"));
    assert_eq!(second.await.expect("task").expect("resolves"), Bytes::from_static(b"key"));

    assert!(
        timeout(Duration::from_millis(100), peer.from_client.recv()).await.is_err(),
        "no duplicate request should reach the wire"
    );
}

#[tokio::test]
async fn distinct_headers_run_independent_negotiations() {
    let (connection, mut peer) = connected().await;

    let rewrap_a = tokio::spawn({
        let connection = connection.clone();
        async move { connection.rewrap(Bytes::from_static(b"header a")).await }
    });
    let request_a = recv_frame(&mut peer).await;

    let rewrap_b = tokio::spawn({
        let connection = connection.clone();
        async move { connection.rewrap(Bytes::from_static(b"header b")).await }
    });
    let request_b = recv_frame(&mut peer).await;

    assert_ne!(request_a.payload, request_b.payload);

    // Answer out of order; correlation ids route each key to its caller.
    let response_b = RewrappedKey {
        request_id: rewrap_request_id(b"header b"),
        key: Bytes::from_static(b"key b"),
    };
    peer.to_client.send(response_b.into_frame()).await.expect("peer channel open");
    assert_eq!(rewrap_b.await.expect("task").expect("resolves"), Bytes::from_static(b"key b"));

    let response_a = RewrappedKey {
        request_id: rewrap_request_id(b"header a"),
        key: Bytes::from_static(b"key a"),
    };
    peer.to_client.send(response_a.into_frame()).await.expect("peer channel open");
    assert_eq!(rewrap_a.await.expect("task").expect("resolves"), Bytes::from_static(b"key a"));
}

#[tokio::test]
async fn close_settles_pending_rewraps() {
    let (connection, mut peer) = connected().await;

    let pending = tokio::spawn({
        let connection = connection.clone();
        async move { connection.rewrap(Bytes::from_static(b"abandoned")).await }
    });
    recv_frame(&mut peer).await;

    connection.close();

    let result = pending.await.expect("task");
    assert!(matches!(result, Err(ClientError::ConnectionClosed)));
}

#[tokio::test]
async fn rewrap_without_connection_fails_fast() {
    let connection = KasConnection::new(test_config(), [7u8; 32]);
    let result = connection.rewrap(Bytes::from_static(b"header")).await;
    assert!(matches!(result, Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn unsolicited_response_is_ignored() {
    let (connection, peer) = connected().await;

    let response =
        RewrappedKey { request_id: [0xAA; 32], key: Bytes::from_static(b"stray") };
    peer.to_client.send(response.into_frame()).await.expect("peer channel open");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(connection.state(), arkavo_client::ConnectionState::Connected);
}
