//! Controller connection manager.
//!
//! This module provides the [`DeviceConnectionManager`], which owns the
//! physical link to the gate controller: discovery, opening the port,
//! framing its byte stream into lines, writing commands and reconnecting on
//! a fixed interval after the link is lost.
//!
//! # Architecture
//!
//! The manager runs as a single task. Everything that touches the link goes
//! through it, so reads and writes are serialized without locks.
//!
//! ```text
//! ┌───────────────┐  LinkEvent   ┌──────────────────┐  ConnectionEvent
//! │ Reader thread │─────────────►│                  │──────────────────► consumer
//! └───────────────┘              │  Manager task    │
//! ┌───────────────┐  tick        │  (LineCodec,     │  watch<LinkStatus>
//! │ ReconnectTimer│─────────────►│   AnyLinkWriter) │──────────────────► observers
//! └───────────────┘              │                  │
//!   ConnectionHandle ──control──►└──────────────────┘
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use gatekeep_hardware::manager::{ConnectionConfig, ConnectionEvent, DeviceConnectionManager};
//! use gatekeep_hardware::serial::SerialPortConnector;
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager =
//!         DeviceConnectionManager::new(ConnectionConfig::default(), SerialPortConnector::new());
//!     let (handle, mut events) = manager.start();
//!
//!     while let Some(event) = events.recv().await {
//!         if let ConnectionEvent::Line(line) = event {
//!             println!("{line:?}");
//!         }
//!     }
//!
//!     handle.shutdown().await;
//! }
//! ```

use crate::devices::AnyConnector;
use crate::discovery::discover;
use crate::error::{HardwareError, Result};
use crate::timer::ReconnectTimer;
use crate::traits::{LinkWriter, SerialConnector, SerialLink};
use crate::types::{ConnectionState, LinkEvent, LinkStatus};
use bytes::BytesMut;
use gatekeep_core::constants::{
    CONTROLLER_PATH_PATTERNS, CONTROLLER_SIGNATURES, DEFAULT_BAUD_RATE, DEFAULT_EVENT_CAPACITY,
    DEFAULT_RECONNECT_INTERVAL_SECS,
};
use gatekeep_protocol::{DeviceCommand, DeviceLine, LineCodec};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, trace, warn};

/// Event produced by the connection manager.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConnectionEvent {
    /// One framed line from the controller.
    Line(DeviceLine),

    /// The link changed state.
    StateChanged {
        /// New state.
        state: ConnectionState,

        /// Port involved in the transition, if known.
        port: Option<String>,
    },
}

/// Configuration for the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Explicit port path. Overrides discovery when set.
    pub port: Option<String>,

    /// Line speed.
    pub baud_rate: u32,

    /// Delay between reconnect attempts while disconnected.
    pub reconnect_interval: Duration,

    /// USB descriptor substrings identifying the controller.
    pub signatures: Vec<String>,

    /// Device path substrings identifying the controller.
    pub path_patterns: Vec<String>,

    /// Capacity of the event channel towards the consumer.
    pub event_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            reconnect_interval: Duration::from_secs(DEFAULT_RECONNECT_INTERVAL_SECS),
            signatures: CONTROLLER_SIGNATURES.iter().map(|s| s.to_string()).collect(),
            path_patterns: CONTROLLER_PATH_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ConnectionConfig {
    /// Use an explicit port instead of discovery.
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Set the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the reconnect interval.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Replace the controller signatures.
    pub fn with_signatures(mut self, signatures: Vec<String>) -> Self {
        self.signatures = signatures;
        self
    }
}

/// Instruction from a [`ConnectionHandle`] to the manager task.
#[derive(Debug)]
enum Control {
    Send(DeviceCommand),
    Shutdown,
}

/// Receiver for events from the manager task.
#[derive(Debug)]
pub struct ConnectionEvents {
    event_rx: mpsc::Receiver<ConnectionEvent>,
}

impl ConnectionEvents {
    /// Receive the next event.
    ///
    /// Returns `None` once the manager has shut down and all events were
    /// consumed.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Try to receive an event without waiting.
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.try_recv().ok()
    }
}

/// Cloneable handle to a running manager.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    // Unbounded so that a consumer issuing commands while the manager is
    // blocked delivering events to it cannot deadlock.
    control_tx: mpsc::UnboundedSender<Control>,
    status_rx: watch::Receiver<LinkStatus>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ConnectionHandle {
    /// Queue a command for the controller.
    ///
    /// Write failures are logged by the manager and never change the
    /// connection state.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::NotConnected`] when the link is not
    /// `Connected`, and [`HardwareError::LinkLost`] once the manager has
    /// stopped. The command is dropped in both cases.
    pub fn send_command(&self, command: DeviceCommand) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Connected {
            warn!(%state, command = command.name(), "Controller not connected, command dropped");
            return Err(HardwareError::NotConnected);
        }
        self.control_tx
            .send(Control::Send(command))
            .map_err(|_| HardwareError::link_lost("connection manager stopped"))
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.status_rx.borrow().state
    }

    /// Current link status snapshot.
    pub fn status(&self) -> LinkStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch link status changes.
    pub fn watch(&self) -> watch::Receiver<LinkStatus> {
        self.status_rx.clone()
    }

    /// Stop the manager: disarm the timer, close the link and wait for the
    /// task to finish. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let _ = self.control_tx.send(Control::Shutdown);
        if let Some(task) = self.task.lock().await.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "Connection manager task failed");
        }
    }
}

/// Owner of the controller link.
#[derive(Debug)]
pub struct DeviceConnectionManager {
    config: ConnectionConfig,
    connector: AnyConnector,
}

impl DeviceConnectionManager {
    /// Create a manager over the given connector.
    pub fn new(config: ConnectionConfig, connector: impl Into<AnyConnector>) -> Self {
        Self {
            config,
            connector: connector.into(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Spawn the manager task and make the first connection attempt.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> (ConnectionHandle, ConnectionEvents) {
        let (event_tx, event_rx) = mpsc::channel(self.config.event_capacity.max(1));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(LinkStatus::default());
        let (timer, ticks) = ReconnectTimer::new(self.config.reconnect_interval);

        let worker = Worker {
            config: self.config,
            connector: self.connector,
            link: None,
            codec: LineCodec::new(),
            buffer: BytesMut::new(),
            timer,
            ticks,
            control_rx,
            event_tx,
            status_tx,
        };

        let task = tokio::spawn(worker.run());

        (
            ConnectionHandle {
                control_tx,
                status_rx,
                task: Arc::new(Mutex::new(Some(task))),
            },
            ConnectionEvents { event_rx },
        )
    }
}

struct Worker {
    config: ConnectionConfig,
    connector: AnyConnector,
    link: Option<SerialLink>,
    codec: LineCodec,
    buffer: BytesMut,
    timer: ReconnectTimer,
    ticks: mpsc::Receiver<()>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    status_tx: watch::Sender<LinkStatus>,
}

impl Worker {
    async fn run(mut self) {
        info!(
            port = self.config.port.as_deref().unwrap_or("auto"),
            baud_rate = self.config.baud_rate,
            "Connection manager started"
        );

        self.try_connect().await;

        loop {
            tokio::select! {
                control = self.control_rx.recv() => match control {
                    Some(Control::Send(command)) => self.write_command(command),
                    Some(Control::Shutdown) | None => break,
                },
                Some(()) = self.ticks.recv() => {
                    if self.state() == ConnectionState::Disconnected {
                        debug!("Reconnect timer fired");
                        self.try_connect().await;
                    }
                }
                event = next_link_event(&mut self.link) => self.handle_link_event(event).await,
            }
        }

        self.timer.disarm();
        let port = self.link.take().map(|link| link.port.path);
        self.set_state(ConnectionState::Disconnected, port).await;
        info!("Connection manager stopped");
    }

    fn state(&self) -> ConnectionState {
        self.status_tx.borrow().state
    }

    async fn try_connect(&mut self) {
        self.set_state(ConnectionState::Connecting, self.config.port.clone())
            .await;

        let port = match discover(
            &self.connector,
            self.config.port.as_deref(),
            &self.config.signatures,
            &self.config.path_patterns,
        ) {
            Ok(port) => port,
            Err(e) => {
                warn!(error = %e, "Controller discovery failed");
                self.enter_disconnected(None).await;
                return;
            }
        };

        match self.connector.open(&port, self.config.baud_rate).await {
            Ok(link) => {
                // Disarm before the new link's events are attached
                self.timer.disarm();
                while self.ticks.try_recv().is_ok() {}
                self.buffer.clear();
                self.codec = LineCodec::new();
                self.link = Some(link);
                info!(port = %port, "Controller connected");
                self.set_state(ConnectionState::Connected, Some(port.path))
                    .await;
            }
            Err(e) => {
                warn!(port = %port.path, error = %e, "Controller connect failed");
                self.enter_disconnected(Some(port.path)).await;
            }
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Data(bytes) => {
                trace!(len = bytes.len(), "Controller data");
                self.buffer.extend_from_slice(&bytes);
                loop {
                    match self.codec.decode(&mut self.buffer) {
                        Ok(Some(line)) => self.emit(ConnectionEvent::Line(line)).await,
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "Dropping undecodable controller data");
                            self.buffer.clear();
                            self.codec = LineCodec::new();
                            break;
                        }
                    }
                }
            }
            LinkEvent::Error(message) => {
                warn!(error = %message, "Controller link error");
                self.link_lost().await;
            }
            LinkEvent::Closed => {
                warn!("Controller link closed");
                self.link_lost().await;
            }
        }
    }

    async fn link_lost(&mut self) {
        let port = self.link.take().map(|link| link.port.path);

        // Flush an unterminated last line
        while let Ok(Some(line)) = self.codec.decode_eof(&mut self.buffer) {
            self.emit(ConnectionEvent::Line(line)).await;
        }
        self.buffer.clear();
        self.codec = LineCodec::new();
        self.enter_disconnected(port).await;
    }

    async fn enter_disconnected(&mut self, port: Option<String>) {
        if self.timer.arm() {
            debug!(
                interval_secs = self.config.reconnect_interval.as_secs(),
                "Reconnect timer armed"
            );
        }
        self.set_state(ConnectionState::Disconnected, port).await;
    }

    fn write_command(&mut self, command: DeviceCommand) {
        let Some(link) = self.link.as_mut() else {
            warn!(command = command.name(), "Controller not connected, command dropped");
            return;
        };

        let mut frame = BytesMut::new();
        let name = command.name();
        if let Err(e) = self.codec.encode(command, &mut frame) {
            warn!(command = name, error = %e, "Failed to encode command");
            return;
        }

        match link.writer.write_all(&frame) {
            Ok(()) => debug!(command = name, "Command sent to controller"),
            Err(e) => warn!(command = name, error = %e, "Failed to write command"),
        }
    }

    async fn set_state(&mut self, state: ConnectionState, port: Option<String>) {
        let armed = self.timer.is_armed();
        let previous = self.state();

        self.status_tx.send_modify(|status| {
            status.state = state;
            status.port = port.clone();
            status.reconnect_armed = armed;
        });

        if previous != state {
            self.emit(ConnectionEvent::StateChanged { state, port }).await;
        }
    }

    async fn emit(&mut self, event: ConnectionEvent) {
        if self.event_tx.send(event).await.is_err() {
            trace!("Connection event receiver dropped");
        }
    }
}

/// Next notification from the open link, or never if there is none.
async fn next_link_event(link: &mut Option<SerialLink>) -> LinkEvent {
    match link {
        Some(link) => link.events.recv().await.unwrap_or(LinkEvent::Closed),
        None => std::future::pending().await,
    }
}
