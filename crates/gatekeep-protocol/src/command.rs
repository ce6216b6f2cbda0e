//! Commands sent from the backend to the gate controller.

use gatekeep_core::TagId;
use gatekeep_core::constants::COMMAND_DELIMITER;
use std::fmt;

/// A command for the controller.
///
/// Rendered as a single colon-delimited line; see [`crate::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Open the gate for `tag` and relock after `auto_lock_seconds`.
    AccessGranted { tag: TagId, auto_lock_seconds: u64 },

    /// Signal a denial for `tag` (red indicator, buzzer).
    AccessDenied { tag: TagId },

    /// Open the gate without a scan.
    OpenGate,

    /// Close the gate.
    CloseGate,
}

impl DeviceCommand {
    /// Command name as written on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::AccessGranted { .. } => "ACCESS_GRANTED",
            DeviceCommand::AccessDenied { .. } => "ACCESS_DENIED",
            DeviceCommand::OpenGate => "OPEN_GATE",
            DeviceCommand::CloseGate => "CLOSE_GATE",
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = COMMAND_DELIMITER;
        match self {
            DeviceCommand::AccessGranted {
                tag,
                auto_lock_seconds,
            } => write!(f, "{}{d}{tag}{d}{auto_lock_seconds}", self.name()),
            DeviceCommand::AccessDenied { tag } => write!(f, "{}{d}{tag}", self.name()),
            DeviceCommand::OpenGate | DeviceCommand::CloseGate => write!(f, "{}", self.name()),
        }
    }
}
