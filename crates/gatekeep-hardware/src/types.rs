//! Common types shared by the serial transport and the connection manager.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Description of an enumerated serial endpoint.
///
/// USB descriptor fields are only present for USB adapters; a port given
/// explicitly in configuration carries just its path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDescriptor {
    /// OS path of the port (e.g., "/dev/ttyACM0", "COM3").
    pub path: String,

    /// USB manufacturer string.
    pub manufacturer: Option<String>,

    /// USB product string.
    pub product: Option<String>,

    /// USB serial number.
    pub serial_number: Option<String>,

    /// USB vendor and product identifiers.
    pub usb_ids: Option<(u16, u16)>,
}

impl PortDescriptor {
    /// Create a descriptor with only a path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            manufacturer: None,
            product: None,
            serial_number: None,
            usb_ids: None,
        }
    }

    /// Set the manufacturer string.
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set the product string.
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    /// Set the serial number.
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set the USB vendor/product identifiers.
    pub fn with_usb_ids(mut self, vid: u16, pid: u16) -> Self {
        self.usb_ids = Some((vid, pid));
        self
    }
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.manufacturer, &self.product) {
            (Some(m), Some(p)) => write!(f, "{} ({m} {p})", self.path),
            (Some(m), None) => write!(f, "{} ({m})", self.path),
            (None, Some(p)) => write!(f, "{} ({p})", self.path),
            (None, None) => write!(f, "{}", self.path),
        }
    }
}

/// State of the controller link.
///
/// Commands may only be written while `Connected`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Snapshot of the link published by the connection manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    /// Current connection state.
    pub state: ConnectionState,

    /// Path of the open (or last attempted) port.
    pub port: Option<String>,

    /// Whether a reconnect timer is currently armed.
    pub reconnect_armed: bool,
}

/// Raw notification from an open serial link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Bytes read from the port, not yet split into lines.
    Data(Bytes),

    /// The transport reported an error; the link is unusable.
    Error(String),

    /// The port was closed (end of stream).
    Closed,
}
