//! Line codec for the gate controller protocol.
//!
//! This module provides the stateless [`decode`]/[`encode`] pair and a
//! Tokio-compatible [`LineCodec`] that frames a raw serial byte stream into
//! [`DeviceLine`]s.
//!
//! # Architecture
//!
//! ```text
//! serial bytes -> LineCodec (split on '\n') -> decode_line -> DeviceLine
//! DeviceCommand -> encode -> "NAME:ARG:ARG" + '\n' -> serial bytes
//! ```
//!
//! # Error Handling
//!
//! Decoding never fails on content. A structured line that cannot be parsed
//! becomes [`DeviceEvent::Unknown`] and the offending text is logged; a line
//! without the marker is a diagnostic. Over-long lines are discarded up to
//! the next newline so one garbled burst cannot stall the stream.

use bytes::{Buf, BufMut, BytesMut};
use serde::Deserialize;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::{DeviceCommand, DeviceEvent, DeviceLine};
use gatekeep_core::constants::{BACKEND_DATA_MARKER, LINE_TERMINATOR, MAX_LINE_LENGTH};
use gatekeep_core::{Error, TagId};

/// JSON payload following the marker.
#[derive(Debug, Deserialize)]
struct Payload {
    event: String,

    #[serde(rename = "cardID", default)]
    card_id: Option<String>,
}

/// Decode one line into a [`DeviceEvent`].
///
/// Lines without the `BACKEND_DATA:` marker and structured lines that do not
/// map to a known event both yield [`DeviceEvent::Unknown`] carrying the raw
/// line. Use [`decode_line`] to tell diagnostics apart.
///
/// # Example
///
/// ```
/// use gatekeep_protocol::{decode, DeviceEvent};
///
/// assert_eq!(decode(r#"BACKEND_DATA:{"event":"GATE_OPEN"}"#), DeviceEvent::GateOpened);
/// assert!(decode("RFID reader initialised").is_unknown());
/// ```
pub fn decode(line: &str) -> DeviceEvent {
    match decode_line(line) {
        DeviceLine::Event(event) => event,
        DeviceLine::Diagnostic(raw) => DeviceEvent::Unknown { raw },
    }
}

/// Classify and decode one line.
///
/// Trailing `\r`/`\n` are stripped before classification.
pub fn decode_line(line: &str) -> DeviceLine {
    let line = line.trim_end_matches(['\r', '\n']);

    let Some(payload) = line.trim_start().strip_prefix(BACKEND_DATA_MARKER) else {
        trace!(line, "controller diagnostic");
        return DeviceLine::Diagnostic(line.to_string());
    };

    DeviceLine::Event(decode_payload(line, payload.trim()))
}

fn decode_payload(raw: &str, payload: &str) -> DeviceEvent {
    let unknown = || DeviceEvent::Unknown {
        raw: raw.to_string(),
    };

    let payload: Payload = match serde_json::from_str(payload) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(raw, error = %e, "malformed controller payload");
            return unknown();
        }
    };

    let tag = || {
        let card_id = payload.card_id.as_deref().unwrap_or_default();
        TagId::new(card_id)
            .inspect_err(|e| warn!(raw, error = %e, "controller event without a usable cardID"))
            .ok()
    };

    let event = match payload.event.trim().to_ascii_uppercase().as_str() {
        "SYSTEM_READY" => Some(DeviceEvent::SystemReady),
        "CARD_SCANNED" => tag().map(|tag| DeviceEvent::CardScanned { tag }),
        "ACCESS_GRANTED" => tag().map(|tag| DeviceEvent::AccessGranted { tag }),
        "ACCESS_DENIED" => tag().map(|tag| DeviceEvent::AccessDenied { tag }),
        "GATE_OPEN" | "GATE_OPENED" => Some(DeviceEvent::GateOpened),
        "GATE_CLOSED" => Some(DeviceEvent::GateClosed),
        other => {
            warn!(raw, event = other, "unrecognized controller event");
            None
        }
    };

    event.unwrap_or_else(unknown)
}

/// Render a command as a single line, without the terminator.
///
/// # Example
///
/// ```
/// use gatekeep_protocol::{encode, DeviceCommand};
///
/// assert_eq!(encode(&DeviceCommand::CloseGate), "CLOSE_GATE");
/// ```
pub fn encode(command: &DeviceCommand) -> String {
    command.to_string()
}

/// Render an event the way the controller firmware prints it.
///
/// Used by the mock controller and by tests; [`DeviceEvent::Unknown`]
/// renders its raw text unchanged.
pub fn encode_event(event: &DeviceEvent) -> String {
    let (Some(name), tag) = (event.wire_name(), event.tag()) else {
        return match event {
            DeviceEvent::Unknown { raw } => raw.clone(),
            _ => String::new(),
        };
    };

    let payload = match tag {
        Some(tag) => serde_json::json!({ "event": name, "cardID": tag.as_str() }),
        None => serde_json::json!({ "event": name }),
    };
    format!("{BACKEND_DATA_MARKER}{payload}")
}

/// Tokio codec splitting the serial stream into [`DeviceLine`]s.
///
/// Follows the approach of `tokio_util::codec::LinesCodec`: it remembers how
/// far the buffer has been scanned so partial lines are not rescanned, and it
/// discards lines longer than `max_length` until the next terminator.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use tokio_util::codec::Decoder;
/// use gatekeep_protocol::{LineCodec, DeviceLine, DeviceEvent};
///
/// let mut codec = LineCodec::new();
/// let mut buffer = BytesMut::from(&b"BACKEND_DATA:{\"event\":\"SYSTEM_READY\"}\r\npartial"[..]);
///
/// let line = codec.decode(&mut buffer).unwrap();
/// assert_eq!(line, Some(DeviceLine::Event(DeviceEvent::SystemReady)));
/// assert_eq!(codec.decode(&mut buffer).unwrap(), None);
/// ```
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Index up to which the buffer has already been searched for a terminator.
    next_index: usize,

    /// Maximum line length in bytes, terminator excluded.
    max_length: usize,

    /// Set while skipping the rest of an over-long line.
    discarding: bool,
}

impl LineCodec {
    /// Create a codec with the default maximum line length.
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom maximum line length.
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
            discarding: false,
        }
    }

    /// Get the maximum line length.
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = DeviceLine;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<DeviceLine>, Error> {
        loop {
            let read_to = src.len().min(self.max_length.saturating_add(1));
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == LINE_TERMINATOR);

            match (self.discarding, newline) {
                (true, Some(offset)) => {
                    src.advance(self.next_index + offset + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let mut line = src.split_to(end + 1);
                    line.truncate(end);

                    let text = String::from_utf8_lossy(&line);
                    if text.trim().is_empty() {
                        continue;
                    }
                    return Ok(Some(decode_line(&text)));
                }
                (false, None) if src.len() > self.max_length => {
                    warn!(
                        max_length = self.max_length,
                        "discarding over-long controller line"
                    );
                    self.discarding = true;
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<DeviceLine>, Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }

        if self.discarding || buf.is_empty() {
            buf.clear();
            self.discarding = false;
            self.next_index = 0;
            return Ok(None);
        }

        // Unterminated trailing line when the link closes
        let line = buf.split();
        self.next_index = 0;
        let text = String::from_utf8_lossy(&line);
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(decode_line(&text)))
    }
}

impl Encoder<DeviceCommand> for LineCodec {
    type Error = Error;

    fn encode(&mut self, item: DeviceCommand, dst: &mut BytesMut) -> Result<(), Error> {
        let line = encode(&item);
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(LINE_TERMINATOR);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tag(s: &str) -> TagId {
        TagId::new(s).unwrap()
    }

    #[rstest]
    #[case(r#"BACKEND_DATA:{"event":"SYSTEM_READY"}"#, DeviceEvent::SystemReady)]
    #[case(r#"BACKEND_DATA:{"event":"CARD_SCANNED","cardID":"D0D39925"}"#, DeviceEvent::CardScanned { tag: tag("D0D39925") })]
    #[case(r#"BACKEND_DATA:{"event":"ACCESS_GRANTED","cardID":"D0D39925"}"#, DeviceEvent::AccessGranted { tag: tag("D0D39925") })]
    #[case(r#"BACKEND_DATA:{"event":"ACCESS_DENIED","cardID":"d0d39925"}"#, DeviceEvent::AccessDenied { tag: tag("D0D39925") })]
    #[case(r#"BACKEND_DATA:{"event":"GATE_OPEN"}"#, DeviceEvent::GateOpened)]
    #[case(r#"BACKEND_DATA:{"event":"GATE_CLOSED"}"#, DeviceEvent::GateClosed)]
    #[case("BACKEND_DATA: {\"event\":\"GATE_CLOSED\"}\r", DeviceEvent::GateClosed)]
    fn test_decode_known_events(#[case] line: &str, #[case] expected: DeviceEvent) {
        assert_eq!(decode(line), expected);
    }

    #[rstest]
    #[case(r#"BACKEND_DATA:{"event":"FIRMWARE_PANIC"}"#)] // unknown event name
    #[case(r#"BACKEND_DATA:{"event":"CARD_SCANNED"}"#)] // missing cardID
    #[case(r#"BACKEND_DATA:{"event":"CARD_SCANNED","cardID":"  "}"#)] // blank cardID
    #[case(r#"BACKEND_DATA:{"event":"CARD_SCANNED","cardID":12345}"#)] // wrong type
    #[case(r#"BACKEND_DATA:{"event":"#)] // truncated JSON
    #[case("BACKEND_DATA:")] // empty payload
    fn test_decode_unrecognized_structured_lines(#[case] line: &str) {
        let event = decode(line);
        assert_eq!(
            event,
            DeviceEvent::Unknown {
                raw: line.to_string()
            }
        );
        assert!(matches!(decode_line(line), DeviceLine::Event(_)));
    }

    #[test]
    fn test_decode_diagnostic_line() {
        let line = "MFRC522 firmware version: 0x92";
        assert_eq!(
            decode_line(line),
            DeviceLine::Diagnostic(line.to_string())
        );
        assert_eq!(
            decode(line),
            DeviceEvent::Unknown {
                raw: line.to_string()
            }
        );
    }

    #[test]
    fn test_encode_event_matches_firmware_format() {
        let event = DeviceEvent::CardScanned {
            tag: tag("D0D39925"),
        };
        let line = encode_event(&event);
        assert!(line.starts_with("BACKEND_DATA:{"));
        assert!(line.contains(r#""cardID":"D0D39925""#));
        assert!(line.contains(r#""event":"CARD_SCANNED""#));
        assert_eq!(decode(&line), event);
    }

    #[test]
    fn test_line_codec_splits_partial_input() {
        let mut codec = LineCodec::new();
        let mut buffer = BytesMut::from(&b"BACKEND_DATA:{\"event\":\"GATE"[..]);
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice(b"_OPEN\"}\nhello\n\n");
        assert_eq!(
            codec.decode(&mut buffer).unwrap(),
            Some(DeviceLine::Event(DeviceEvent::GateOpened))
        );
        assert_eq!(
            codec.decode(&mut buffer).unwrap(),
            Some(DeviceLine::Diagnostic("hello".to_string()))
        );
        // Blank line is skipped
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_line_codec_discards_overlong_line() {
        let mut codec = LineCodec::with_max_length(16);
        let mut buffer = BytesMut::from(&b"0123456789abcdefXYZ"[..]);
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);

        buffer.extend_from_slice(b"still junk\nok\n");
        assert_eq!(
            codec.decode(&mut buffer).unwrap(),
            Some(DeviceLine::Diagnostic("ok".to_string()))
        );
    }

    #[test]
    fn test_line_codec_eof_flushes_trailing_line() {
        let mut codec = LineCodec::new();
        let mut buffer = BytesMut::from(&b"booting"[..]);
        assert_eq!(
            codec.decode_eof(&mut buffer).unwrap(),
            Some(DeviceLine::Diagnostic("booting".to_string()))
        );
        assert_eq!(codec.decode_eof(&mut buffer).unwrap(), None);
    }

    #[test]
    fn test_line_codec_encodes_terminated_command() {
        let mut codec = LineCodec::new();
        let mut buffer = BytesMut::new();
        codec
            .encode(
                DeviceCommand::AccessGranted {
                    tag: tag("ABCD1234"),
                    auto_lock_seconds: 8,
                },
                &mut buffer,
            )
            .unwrap();
        assert_eq!(&buffer[..], b"ACCESS_GRANTED:ABCD1234:8\n");
    }
}
