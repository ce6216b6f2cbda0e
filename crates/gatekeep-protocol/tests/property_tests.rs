//! Property-based tests for the controller line protocol.
//!
//! These tests use proptest to generate random inputs and verify that the
//! codec invariants hold: every event survives the firmware rendering, and
//! no input line ever makes decoding fail.

use bytes::BytesMut;
use gatekeep_core::TagId;
use gatekeep_protocol::{
    DeviceCommand, DeviceEvent, DeviceLine, LineCodec, decode, decode_line, encode, encode_event,
};
use proptest::prelude::*;
use tokio_util::codec::Decoder;

/// Strategy for generating valid tags (hex UIDs of common lengths).
fn valid_tag() -> impl Strategy<Value = TagId> {
    prop::string::string_regex("[0-9A-Fa-f]{8}|[0-9A-Fa-f]{14}|[0-9A-Fa-f]{20}")
        .expect("Failed to create tag regex strategy")
        .prop_map(|s| TagId::new(&s).expect("generated tag is valid"))
}

/// Strategy for generating every event variant the controller can emit.
fn device_event() -> impl Strategy<Value = DeviceEvent> {
    prop_oneof![
        Just(DeviceEvent::SystemReady),
        Just(DeviceEvent::GateOpened),
        Just(DeviceEvent::GateClosed),
        valid_tag().prop_map(|tag| DeviceEvent::CardScanned { tag }),
        valid_tag().prop_map(|tag| DeviceEvent::AccessGranted { tag }),
        valid_tag().prop_map(|tag| DeviceEvent::AccessDenied { tag }),
    ]
}

proptest! {
    /// Property: the firmware rendering of any event decodes to the same event.
    #[test]
    fn prop_event_roundtrip(event in device_event()) {
        let line = encode_event(&event);
        prop_assert_eq!(decode(&line), event);
    }

    /// Property: lines without the marker are diagnostics and never fail.
    #[test]
    fn prop_non_marker_line_is_unknown(line in "[^\r\n]{0,120}") {
        prop_assume!(!line.trim_start().starts_with("BACKEND_DATA:"));
        prop_assert_eq!(
            decode(&line),
            DeviceEvent::Unknown { raw: line.clone() }
        );
        prop_assert_eq!(decode_line(&line), DeviceLine::Diagnostic(line));
    }

    /// Property: arbitrary payloads after the marker never panic.
    #[test]
    fn prop_arbitrary_payload_never_panics(payload in "[^\r\n]{0,200}") {
        let line = format!("BACKEND_DATA:{payload}");
        prop_assert!(matches!(decode_line(&line), DeviceLine::Event(_)));
    }

    /// Property: grant commands always render as three colon-separated tokens.
    #[test]
    fn prop_grant_command_shape(tag in valid_tag(), seconds in 0u64..3600) {
        let line = encode(&DeviceCommand::AccessGranted {
            tag: tag.clone(),
            auto_lock_seconds: seconds,
        });
        let parts: Vec<&str> = line.split(':').collect();
        prop_assert_eq!(parts.len(), 3);
        prop_assert_eq!(parts[0], "ACCESS_GRANTED");
        prop_assert_eq!(parts[1], tag.as_str());
        let rendered = seconds.to_string();
        prop_assert_eq!(parts[2], rendered.as_str());
    }

    /// Property: arbitrary byte streams split anywhere yield the same lines.
    #[test]
    fn prop_framing_independent_of_chunking(
        events in prop::collection::vec(device_event(), 1..10),
        split in 1usize..64,
    ) {
        let mut wire = Vec::new();
        for event in &events {
            wire.extend_from_slice(encode_event(event).as_bytes());
            wire.push(b'\n');
        }

        let mut codec = LineCodec::new();
        let mut buffer = BytesMut::new();
        let mut decoded = Vec::new();
        for chunk in wire.chunks(split) {
            buffer.extend_from_slice(chunk);
            while let Some(line) = codec.decode(&mut buffer).expect("decode never fails") {
                decoded.push(line);
            }
        }

        let expected: Vec<DeviceLine> = events.into_iter().map(DeviceLine::Event).collect();
        prop_assert_eq!(decoded, expected);
    }
}
