//! Serial transport and connection lifecycle for the Gatekeep gate controller.
//!
//! The gate controller is a microcontroller behind a USB-serial bridge. This
//! crate finds it, opens it, keeps it open and turns its byte stream into
//! framed [`gatekeep_protocol::DeviceLine`]s.
//!
//! # Layers
//!
//! - [`traits`]: the [`SerialConnector`] / [`LinkWriter`] seam between the
//!   manager and a concrete transport.
//! - [`serial`]: the real transport over the `serialport` crate.
//! - [`mock`]: a scripted transport for tests and development.
//! - [`discovery`]: picking the controller among enumerated ports.
//! - [`timer`]: the idempotent fixed-interval reconnect timer.
//! - [`manager`]: the [`DeviceConnectionManager`] task tying it together.
//!
//! # Connection Lifecycle
//!
//! ```text
//!                 discover + open ok
//!  Disconnected ──► Connecting ─────────────► Connected
//!       ▲               │                         │
//!       │  failure      │          error / close  │
//!       └───────────────┴─────────────────────────┘
//!            (reconnect timer armed while Disconnected)
//! ```
//!
//! # Examples
//!
//! ```
//! use gatekeep_hardware::manager::{ConnectionConfig, DeviceConnectionManager};
//! use gatekeep_hardware::mock::MockConnector;
//! use gatekeep_hardware::types::ConnectionState;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (connector, _controller) = MockConnector::with_controller("/dev/ttyACM0");
//!     let manager = DeviceConnectionManager::new(ConnectionConfig::default(), connector);
//!     let (handle, _events) = manager.start();
//!
//!     let mut status = handle.watch();
//!     status
//!         .wait_for(|s| s.state == ConnectionState::Connected)
//!         .await
//!         .unwrap();
//!
//!     handle.shutdown().await;
//! }
//! ```

pub mod devices;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod mock;
pub mod serial;
pub mod timer;
pub mod traits;
pub mod types;

pub use devices::{AnyConnector, AnyLinkWriter};
pub use error::{HardwareError, Result};
pub use manager::{
    ConnectionConfig, ConnectionEvent, ConnectionEvents, ConnectionHandle,
    DeviceConnectionManager,
};
pub use traits::{LinkWriter, SerialConnector, SerialLink};
pub use types::{ConnectionState, LinkEvent, LinkStatus, PortDescriptor};
