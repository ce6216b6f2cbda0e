//! Events reported by the gate controller.

use gatekeep_core::TagId;
use std::fmt;

/// A decoded controller event.
///
/// Produced only by the codec. Each event is handled once by the access
/// pipeline and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Controller finished booting and is ready for scans.
    SystemReady,

    /// A tag was presented to the reader.
    CardScanned { tag: TagId },

    /// Controller acknowledged a grant for this tag.
    AccessGranted { tag: TagId },

    /// Controller acknowledged a denial for this tag.
    AccessDenied { tag: TagId },

    /// Gate motor reports the gate open.
    GateOpened,

    /// Gate motor reports the gate closed.
    GateClosed,

    /// Structured line that could not be mapped to a known event.
    Unknown { raw: String },
}

impl DeviceEvent {
    /// Wire name of the event, as carried in the `event` field.
    #[must_use]
    pub fn wire_name(&self) -> Option<&'static str> {
        match self {
            DeviceEvent::SystemReady => Some("SYSTEM_READY"),
            DeviceEvent::CardScanned { .. } => Some("CARD_SCANNED"),
            DeviceEvent::AccessGranted { .. } => Some("ACCESS_GRANTED"),
            DeviceEvent::AccessDenied { .. } => Some("ACCESS_DENIED"),
            DeviceEvent::GateOpened => Some("GATE_OPEN"),
            DeviceEvent::GateClosed => Some("GATE_CLOSED"),
            DeviceEvent::Unknown { .. } => None,
        }
    }

    /// Tag carried by the event, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&TagId> {
        match self {
            DeviceEvent::CardScanned { tag }
            | DeviceEvent::AccessGranted { tag }
            | DeviceEvent::AccessDenied { tag } => Some(tag),
            _ => None,
        }
    }

    /// Returns `true` for events that could not be decoded.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, DeviceEvent::Unknown { .. })
    }
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.wire_name(), self.tag()) {
            (Some(name), Some(tag)) => write!(f, "{name}({tag})"),
            (Some(name), None) => write!(f, "{name}"),
            (None, _) => write!(f, "UNKNOWN"),
        }
    }
}

/// One line read from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceLine {
    /// Marker-prefixed structured event.
    Event(DeviceEvent),

    /// Free-text firmware output, surfaced verbatim.
    Diagnostic(String),
}
