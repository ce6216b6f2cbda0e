//! Transport traits for the controller's serial link.
//!
//! The connection manager never talks to `serialport` directly. It goes
//! through [`SerialConnector`] to enumerate endpoints and open a link, and
//! through [`LinkWriter`] to push command bytes. Implementations exist for
//! real hardware ([`crate::serial::SerialPortConnector`]) and for tests
//! ([`crate::mock::MockConnector`]).
//!
//! # Async Traits
//!
//! [`SerialConnector::open`] uses native `async fn` in traits (Rust 1.90 +
//! Edition 2024). Such traits are not object-safe, so the manager holds the
//! enum wrapper [`crate::devices::AnyConnector`] instead of `Box<dyn _>`.

use crate::Result;
use crate::devices::AnyLinkWriter;
use crate::types::{LinkEvent, PortDescriptor};
use tokio::sync::mpsc;

/// Opens serial links to the gate controller.
///
/// # Examples
///
/// ```no_run
/// use gatekeep_hardware::traits::SerialConnector;
/// use gatekeep_hardware::Result;
///
/// async fn open_first<C: SerialConnector>(connector: &C) -> Result<()> {
///     let ports = connector.available_ports()?;
///     if let Some(port) = ports.first() {
///         let link = connector.open(port, 9600).await?;
///         println!("opened {}", link.port.path);
///     }
///     Ok(())
/// }
/// ```
pub trait SerialConnector: Send + Sync {
    /// Enumerate the serial endpoints currently present.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform enumeration fails.
    fn available_ports(&self) -> Result<Vec<PortDescriptor>>;

    /// Open `port` at `baud_rate` and start delivering its bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HardwareError::ConnectFailed`] if the port cannot be
    /// opened or configured.
    async fn open(&self, port: &PortDescriptor, baud_rate: u32) -> Result<SerialLink>;
}

/// Write half of an open link.
pub trait LinkWriter: Send {
    /// Hand all of `bytes` to the link for transmission.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HardwareError::WriteFailed`] if the transport rejects
    /// the write.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;
}

/// An open link to the controller.
///
/// Dropping the link closes it: the writer releases the port and the reader
/// stops once it notices its channel is gone.
#[derive(Debug)]
pub struct SerialLink {
    /// The endpoint this link was opened on.
    pub port: PortDescriptor,

    /// Raw data, error and close notifications from the reader.
    pub events: mpsc::Receiver<LinkEvent>,

    /// Write half.
    pub writer: AnyLinkWriter,
}
