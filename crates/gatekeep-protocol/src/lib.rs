//! Line protocol between the backend and the gate controller.
//!
//! The controller reports events as `BACKEND_DATA:{json}` lines and prints
//! free-text diagnostics on the same link. The backend answers with
//! colon-delimited command lines.
//!
//! ```
//! use gatekeep_protocol::{DeviceCommand, DeviceEvent, decode, encode};
//! use gatekeep_core::TagId;
//!
//! let event = decode(r#"BACKEND_DATA:{"event":"CARD_SCANNED","cardID":"D0D39925"}"#);
//! let tag = TagId::new("D0D39925").unwrap();
//! assert_eq!(event, DeviceEvent::CardScanned { tag: tag.clone() });
//!
//! let line = encode(&DeviceCommand::AccessGranted { tag, auto_lock_seconds: 8 });
//! assert_eq!(line, "ACCESS_GRANTED:D0D39925:8");
//! ```

pub mod codec;
pub mod command;
pub mod event;

pub use codec::{LineCodec, decode, decode_line, encode, encode_event};
pub use command::DeviceCommand;
pub use event::{DeviceEvent, DeviceLine};
