//! Error types for serial link operations.
//!
//! This module defines error types for the controller link: discovery,
//! opening the port, losing an open link, and writing commands. Link faults
//! are handled by the connection manager, which schedules a reconnect. Only
//! [`HardwareError::NotConnected`] reaches callers, when a command is issued
//! while the link is down.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur while talking to the gate controller.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// No serial endpoint matched a known controller signature.
    #[error("Controller discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    /// An endpoint was found but could not be opened.
    #[error("Failed to open {port}: {message}")]
    ConnectFailed { port: String, message: String },

    /// The open link reported an error or was closed.
    #[error("Link lost: {message}")]
    LinkLost { message: String },

    /// No link is currently open.
    #[error("Controller not connected")]
    NotConnected,

    /// Writing a command to the link failed.
    #[error("Write failed: {message}")]
    WriteFailed { message: String },

    /// Serial port enumeration or configuration error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new discovery failed error.
    pub fn discovery_failed(reason: impl Into<String>) -> Self {
        Self::DiscoveryFailed {
            reason: reason.into(),
        }
    }

    /// Create a new connect failed error.
    pub fn connect_failed(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create a new link lost error.
    pub fn link_lost(message: impl Into<String>) -> Self {
        Self::LinkLost {
            message: message.into(),
        }
    }

    /// Create a new write failed error.
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_failed_error() {
        let error = HardwareError::discovery_failed("no matching port");
        assert!(matches!(error, HardwareError::DiscoveryFailed { .. }));
        assert_eq!(
            error.to_string(),
            "Controller discovery failed: no matching port"
        );
    }

    #[test]
    fn test_connect_failed_error() {
        let error = HardwareError::connect_failed("/dev/ttyACM0", "Permission denied");
        assert_eq!(
            error.to_string(),
            "Failed to open /dev/ttyACM0: Permission denied"
        );
    }

    #[test]
    fn test_link_lost_error() {
        let error = HardwareError::link_lost("device unplugged");
        assert_eq!(error.to_string(), "Link lost: device unplugged");
    }

    #[test]
    fn test_write_failed_and_not_connected_errors() {
        let error = HardwareError::write_failed("broken pipe");
        assert_eq!(error.to_string(), "Write failed: broken pipe");
        assert_eq!(
            HardwareError::NotConnected.to_string(),
            "Controller not connected"
        );
    }
}
