//! Enum wrappers for transport dispatch.
//!
//! Native `async fn` in traits (RPITIT, Edition 2024) is not object-safe, so
//! we cannot hold a `Box<dyn SerialConnector>`. These enums provide concrete
//! type dispatch at compile time instead.
//!
//! # Examples
//!
//! ```
//! use gatekeep_hardware::devices::AnyConnector;
//! use gatekeep_hardware::mock::MockConnector;
//!
//! let (connector, _handle) = MockConnector::new();
//! let any_connector = AnyConnector::Mock(connector);
//! ```

use crate::Result;
use crate::mock::{MockConnector, MockWriter};
use crate::serial::{SerialPortConnector, SerialWriter};
use crate::traits::{LinkWriter, SerialConnector, SerialLink};
use crate::types::PortDescriptor;

/// Enum wrapper for serial connector dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyConnector {
    /// Real serial ports via the `serialport` crate.
    Serial(SerialPortConnector),

    /// Scripted connector for development and testing.
    Mock(MockConnector),
}

impl SerialConnector for AnyConnector {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>> {
        match self {
            Self::Serial(connector) => connector.available_ports(),
            Self::Mock(connector) => connector.available_ports(),
        }
    }

    async fn open(&self, port: &PortDescriptor, baud_rate: u32) -> Result<SerialLink> {
        match self {
            Self::Serial(connector) => connector.open(port, baud_rate).await,
            Self::Mock(connector) => connector.open(port, baud_rate).await,
        }
    }
}

impl From<SerialPortConnector> for AnyConnector {
    fn from(connector: SerialPortConnector) -> Self {
        Self::Serial(connector)
    }
}

impl From<MockConnector> for AnyConnector {
    fn from(connector: MockConnector) -> Self {
        Self::Mock(connector)
    }
}

/// Enum wrapper for the write half of a link.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyLinkWriter {
    /// Writer over a real serial port.
    Serial(SerialWriter),

    /// Writer that records lines for inspection.
    Mock(MockWriter),
}

impl LinkWriter for AnyLinkWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Self::Serial(writer) => writer.write_all(bytes),
            Self::Mock(writer) => writer.write_all(bytes),
        }
    }
}
