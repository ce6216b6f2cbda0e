//! Serial transport backed by the `serialport` crate.
//!
//! `serialport` is a blocking API. Opening runs on tokio's blocking pool and
//! each open link gets two dedicated threads: a reader that forwards raw
//! chunks into a bounded channel, and a writer that drains queued command
//! frames. The manager task sits between both channels, so it never blocks on
//! the port itself.

use crate::devices::AnyLinkWriter;
use crate::error::{HardwareError, Result};
use crate::traits::{LinkWriter, SerialConnector, SerialLink};
use crate::types::{LinkEvent, PortDescriptor};
use bytes::Bytes;
use gatekeep_core::constants::SERIAL_READ_TIMEOUT_MS;
use serialport::{SerialPort, SerialPortType};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Capacity of the reader → manager channel.
const LINK_CHANNEL_CAPACITY: usize = 64;

/// Size of a single blocking read.
const READ_CHUNK_SIZE: usize = 512;

/// Connector for physical serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortConnector;

impl SerialPortConnector {
    /// Create a new connector.
    pub fn new() -> Self {
        Self
    }
}

impl SerialConnector for SerialPortConnector {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>> {
        let ports = serialport::available_ports()?;

        Ok(ports
            .into_iter()
            .map(|info| {
                let descriptor = PortDescriptor::new(info.port_name);
                match info.port_type {
                    SerialPortType::UsbPort(usb) => {
                        let mut descriptor = descriptor.with_usb_ids(usb.vid, usb.pid);
                        descriptor.manufacturer = usb.manufacturer;
                        descriptor.product = usb.product;
                        descriptor.serial_number = usb.serial_number;
                        descriptor
                    }
                    _ => descriptor,
                }
            })
            .collect())
    }

    async fn open(&self, port: &PortDescriptor, baud_rate: u32) -> Result<SerialLink> {
        let path = port.path.clone();

        let opened = tokio::task::spawn_blocking(move || {
            serialport::new(&path, baud_rate)
                .timeout(Duration::from_millis(SERIAL_READ_TIMEOUT_MS))
                .open()
        })
        .await
        .map_err(|e| HardwareError::connect_failed(&port.path, e.to_string()))?;

        let serial = opened.map_err(|e| HardwareError::connect_failed(&port.path, e.to_string()))?;
        let reader = serial
            .try_clone()
            .map_err(|e| HardwareError::connect_failed(&port.path, e.to_string()))?;

        let (tx, rx) = mpsc::channel(LINK_CHANNEL_CAPACITY);
        spawn_reader(port.path.clone(), reader, tx)?;
        let writer = spawn_writer(port.path.clone(), serial)?;

        debug!(port = %port.path, baud_rate, "Serial port opened");

        Ok(SerialLink {
            port: port.clone(),
            events: rx,
            writer: AnyLinkWriter::Serial(writer),
        })
    }
}

/// Start the blocking reader thread for one link.
fn spawn_reader(
    path: String,
    mut port: Box<dyn SerialPort>,
    tx: mpsc::Sender<LinkEvent>,
) -> Result<()> {
    std::thread::Builder::new()
        .name(format!("serial-reader:{path}"))
        .spawn(move || {
            let mut buf = [0u8; READ_CHUNK_SIZE];
            loop {
                match port.read(&mut buf) {
                    Ok(0) => {
                        let _ = tx.blocking_send(LinkEvent::Closed);
                        break;
                    }
                    Ok(n) => {
                        let chunk = Bytes::copy_from_slice(&buf[..n]);
                        if tx.blocking_send(LinkEvent::Data(chunk)).is_err() {
                            // Link dropped by the manager
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::TimedOut => {
                        if tx.is_closed() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => {}
                    Err(e) => {
                        warn!(port = %path, error = %e, "Serial read failed");
                        let _ = tx.blocking_send(LinkEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            debug!(port = %path, "Serial reader stopped");
        })?;

    Ok(())
}

/// Start the blocking writer thread for one link.
///
/// The thread exits, closing its handle on the port, once the returned
/// writer is dropped.
fn spawn_writer(path: String, mut port: Box<dyn SerialPort>) -> Result<SerialWriter> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    std::thread::Builder::new()
        .name(format!("serial-writer:{path}"))
        .spawn(move || {
            while let Some(frame) = rx.blocking_recv() {
                if let Err(e) = port.write_all(&frame).and_then(|()| port.flush()) {
                    warn!(port = %path, error = %e, "Serial write failed");
                }
            }
            debug!(port = %path, "Serial writer stopped");
        })?;

    Ok(SerialWriter { frames: tx })
}

/// Write half of a physical serial port.
///
/// Frames are queued to the link's writer thread; a failed write on the port
/// is logged there.
#[derive(Debug)]
pub struct SerialWriter {
    frames: mpsc::UnboundedSender<Bytes>,
}

impl LinkWriter for SerialWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.frames
            .send(Bytes::copy_from_slice(bytes))
            .map_err(|_| HardwareError::write_failed("serial writer stopped"))
    }
}
