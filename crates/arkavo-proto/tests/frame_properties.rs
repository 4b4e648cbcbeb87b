//! Property-based tests for frame encoding/decoding.
//!
//! These tests verify the codec for ALL valid inputs, not just specific
//! examples: round-trip identity across the whole tag space, empty and
//! large payloads, and stream-addressed payload parsing.

use arkavo_proto::{Frame, MessageType, STREAM_ID_SIZE, StreamId};
use bytes::Bytes;
use proptest::prelude::*;

/// Strategy for generating arbitrary known message types.
fn arbitrary_message_type() -> impl Strategy<Value = MessageType> {
    prop_oneof![
        Just(MessageType::PublicKey),
        Just(MessageType::KasPublicKey),
        Just(MessageType::RewrapRequest),
        Just(MessageType::RewrappedKey),
        Just(MessageType::Message),
    ]
}

#[test]
fn prop_frame_encode_decode_roundtrip() {
    proptest!(|(
        message_type in arbitrary_message_type(),
        payload in prop::collection::vec(any::<u8>(), 0..1024),
    )| {
        let frame = Frame::new(message_type, Bytes::from(payload));

        let decoded = Frame::decode(&frame.encode()).expect("decode should succeed");

        // PROPERTY: Round-trip must be identity
        prop_assert_eq!(decoded.type_tag, frame.type_tag, "Tag mismatch after round-trip");
        prop_assert_eq!(decoded.payload, frame.payload, "Payload mismatch after round-trip");
    });
}

#[test]
fn prop_roundtrip_holds_for_any_tag_byte() {
    proptest!(|(
        type_tag in any::<u8>(),
        payload in prop::collection::vec(any::<u8>(), 0..256),
    )| {
        // Unknown tags are not a codec concern - they must survive
        // round-trip so the router can decide to drop them.
        let mut wire = vec![type_tag];
        wire.extend_from_slice(&payload);

        let decoded = Frame::decode(&wire).expect("decode should succeed for any tag");
        prop_assert_eq!(decoded.type_tag, type_tag);
        prop_assert_eq!(decoded.payload.as_ref(), payload.as_slice());
        prop_assert_eq!(decoded.encode(), wire);
    });
}

#[test]
fn prop_frame_empty_payload() {
    proptest!(|(message_type in arbitrary_message_type())| {
        let frame = Frame::new(message_type, Bytes::new());
        let wire = frame.encode();

        // PROPERTY: A frame is never smaller than its tag byte
        prop_assert_eq!(wire.len(), 1);

        let decoded = Frame::decode(&wire).expect("decode should succeed");
        prop_assert_eq!(decoded.payload.len(), 0, "Empty payload should remain empty");
        prop_assert_eq!(decoded.message_type(), Some(message_type));
    });
}

#[test]
fn prop_encoded_size_correct() {
    proptest!(|(
        message_type in arbitrary_message_type(),
        payload in prop::collection::vec(any::<u8>(), 0..2048),
    )| {
        let frame = Frame::new(message_type, Bytes::from(payload.clone()));

        // PROPERTY: Encoded size must equal tag byte + payload size
        prop_assert_eq!(frame.encode().len(), 1 + payload.len());
    });
}

#[test]
fn prop_stream_addressed_payload_roundtrip() {
    proptest!(|(
        id_bytes in prop::collection::vec(any::<u8>(), STREAM_ID_SIZE),
        content in prop::collection::vec(any::<u8>(), 0..512),
    )| {
        let mut id = [0u8; STREAM_ID_SIZE];
        id.copy_from_slice(&id_bytes);
        let stream_id = StreamId::new(id);

        let frame = Frame::new(MessageType::Message, stream_id.prefix_to(&content));
        let decoded = Frame::decode(&frame.encode()).expect("decode should succeed");

        let (parsed_id, rest) = StreamId::split_from(&decoded.payload)
            .expect("stream id should parse");

        // PROPERTY: The embedded identifier and content are recovered exactly
        prop_assert_eq!(parsed_id, stream_id);
        prop_assert_eq!(rest.as_ref(), content.as_slice());
    });
}

#[test]
fn prop_short_stream_payload_rejected() {
    proptest!(|(payload in prop::collection::vec(any::<u8>(), 0..STREAM_ID_SIZE))| {
        let bytes = Bytes::from(payload);

        // PROPERTY: Anything under 32 bytes cannot carry a stream id
        prop_assert!(StreamId::split_from(&bytes).is_err());
    });
}
