//! Mock serial connector.
//!
//! The connector and its [`MockControllerHandle`] share one state. The handle
//! plays the part of the controller and of the operator: it plugs the device
//! in and out, pushes lines onto the open link and observes the commands the
//! backend writes.

use crate::devices::AnyLinkWriter;
use crate::error::{HardwareError, Result};
use crate::traits::{LinkWriter, SerialConnector, SerialLink};
use crate::types::{LinkEvent, PortDescriptor};
use bytes::Bytes;
use gatekeep_protocol::{DeviceEvent, encode_event};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Capacity of the simulated link channel.
const MOCK_LINK_CAPACITY: usize = 64;

#[derive(Debug)]
struct MockState {
    /// Endpoints reported by enumeration.
    ports: Vec<PortDescriptor>,

    /// Sender side of the currently open link.
    link_tx: Option<mpsc::Sender<LinkEvent>>,

    /// Error returned by the next open attempts.
    open_failure: Option<String>,

    /// Error returned by writes.
    write_failure: Option<String>,

    /// Lines written by the backend.
    written_tx: mpsc::UnboundedSender<String>,

    /// Every line written so far.
    written: Vec<String>,

    /// Number of open attempts.
    open_count: usize,
}

#[derive(Debug, Clone)]
struct Shared(Arc<Mutex<MockState>>);

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mock connector for testing and development.
///
/// # Examples
///
/// ```
/// use gatekeep_hardware::mock::MockConnector;
/// use gatekeep_hardware::traits::SerialConnector;
/// use gatekeep_hardware::types::PortDescriptor;
///
/// #[tokio::main]
/// async fn main() -> gatekeep_hardware::Result<()> {
///     let (connector, handle) = MockConnector::new();
///     handle.plug_in(PortDescriptor::new("/dev/ttyACM0").with_manufacturer("Arduino LLC"));
///
///     let ports = connector.available_ports()?;
///     let mut link = connector.open(&ports[0], 9600).await?;
///
///     handle.send_line("hello").await;
///     assert!(link.events.recv().await.is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockConnector {
    shared: Shared,
}

impl MockConnector {
    /// Create a connector with no endpoints plugged in.
    pub fn new() -> (Self, MockControllerHandle) {
        let (written_tx, written_rx) = mpsc::unbounded_channel();
        let shared = Shared(Arc::new(Mutex::new(MockState {
            ports: Vec::new(),
            link_tx: None,
            open_failure: None,
            write_failure: None,
            written_tx,
            written: Vec::new(),
            open_count: 0,
        })));

        (
            Self {
                shared: shared.clone(),
            },
            MockControllerHandle { shared, written_rx },
        )
    }

    /// Create a connector with a single Arduino-like endpoint present.
    pub fn with_controller(path: impl Into<String>) -> (Self, MockControllerHandle) {
        let (connector, handle) = Self::new();
        handle.plug_in(
            PortDescriptor::new(path)
                .with_manufacturer("Arduino (www.arduino.cc)")
                .with_usb_ids(0x2341, 0x0043),
        );
        (connector, handle)
    }
}

impl SerialConnector for MockConnector {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>> {
        Ok(self.shared.lock().ports.clone())
    }

    async fn open(&self, port: &PortDescriptor, _baud_rate: u32) -> Result<SerialLink> {
        let mut state = self.shared.lock();
        state.open_count += 1;

        if let Some(message) = &state.open_failure {
            return Err(HardwareError::connect_failed(&port.path, message));
        }

        if !state.ports.iter().any(|p| p.path == port.path) {
            return Err(HardwareError::connect_failed(&port.path, "No such device"));
        }

        let (tx, rx) = mpsc::channel(MOCK_LINK_CAPACITY);
        state.link_tx = Some(tx);

        Ok(SerialLink {
            port: port.clone(),
            events: rx,
            writer: AnyLinkWriter::Mock(MockWriter {
                shared: self.shared.clone(),
                pending: Vec::new(),
            }),
        })
    }
}

/// Writer half of a mock link. Completed lines are reported to the handle.
#[derive(Debug)]
pub struct MockWriter {
    shared: Shared,
    pending: Vec<u8>,
}

impl LinkWriter for MockWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.shared.lock();
        if let Some(message) = &state.write_failure {
            return Err(HardwareError::write_failed(message));
        }

        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..pos]).into_owned();
            state.written.push(line.clone());
            let _ = state.written_tx.send(line);
        }
        Ok(())
    }
}

/// Handle controlling a [`MockConnector`].
#[derive(Debug)]
pub struct MockControllerHandle {
    shared: Shared,
    written_rx: mpsc::UnboundedReceiver<String>,
}

impl MockControllerHandle {
    /// Make an endpoint visible to enumeration.
    pub fn plug_in(&self, port: PortDescriptor) {
        let mut state = self.shared.lock();
        state.ports.retain(|p| p.path != port.path);
        state.ports.push(port);
    }

    /// Remove every endpoint and close the open link.
    pub fn unplug(&self) {
        let link_tx = {
            let mut state = self.shared.lock();
            state.ports.clear();
            state.link_tx.take()
        };
        if let Some(tx) = link_tx {
            let _ = tx.try_send(LinkEvent::Closed);
        }
    }

    /// Report a transport error on the open link. Endpoints stay present.
    pub fn fail_link(&self, message: impl Into<String>) {
        let link_tx = self.shared.lock().link_tx.take();
        if let Some(tx) = link_tx {
            let _ = tx.try_send(LinkEvent::Error(message.into()));
        }
    }

    /// Make subsequent open attempts fail (`None` clears the failure).
    pub fn set_open_failure(&self, message: Option<&str>) {
        self.shared.lock().open_failure = message.map(str::to_string);
    }

    /// Make subsequent writes fail (`None` clears the failure).
    pub fn set_write_failure(&self, message: Option<&str>) {
        self.shared.lock().write_failure = message.map(str::to_string);
    }

    /// Whether a link is currently open.
    pub fn is_link_open(&self) -> bool {
        self.shared
            .lock()
            .link_tx
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Push raw bytes onto the open link.
    ///
    /// Returns `false` if no link is open.
    pub async fn send_raw(&self, bytes: impl Into<Bytes>) -> bool {
        let link_tx = self.shared.lock().link_tx.clone();
        match link_tx {
            Some(tx) => tx.send(LinkEvent::Data(bytes.into())).await.is_ok(),
            None => false,
        }
    }

    /// Push one line (terminator appended) onto the open link.
    pub async fn send_line(&self, line: &str) -> bool {
        self.send_raw(format!("{line}\n")).await
    }

    /// Push a controller event, rendered as a `BACKEND_DATA:` line.
    pub async fn send_event(&self, event: &DeviceEvent) -> bool {
        self.send_line(&encode_event(event)).await
    }

    /// Wait for the next line written by the backend.
    pub async fn next_written(&mut self) -> Option<String> {
        self.written_rx.recv().await
    }

    /// Every line written so far.
    pub fn written(&self) -> Vec<String> {
        self.shared.lock().written.clone()
    }

    /// Number of open attempts made through the connector.
    pub fn open_count(&self) -> usize {
        self.shared.lock().open_count
    }
}
