//! Access-control engine for an RFID-guarded gate.
//!
//! This crate turns controller events into access decisions and gate
//! movements, and fans the outcome out to live observers.
//!
//! - [`debounce`]: per-tag scan cooldown
//! - [`decision`]: the access policy, a pure function
//! - [`gate`]: gate state machine with auto-relock
//! - [`broadcast`]: topic-based fan-out of engine events
//! - [`collaborators`] / [`memory`]: interfaces to external stores and their
//!   in-memory implementations
//! - [`config`]: layered configuration
//! - [`service`]: the [`AccessController`] tying it all together
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use gatekeep_access::memory::{InMemoryAccessLog, InMemorySettings, InMemoryUserDirectory};
//! use gatekeep_access::{AccessConfig, AccessController, Collaborators, Topic};
//! use gatekeep_hardware::{ConnectionConfig, DeviceConnectionManager};
//! use gatekeep_hardware::serial::SerialPortConnector;
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager =
//!         DeviceConnectionManager::new(ConnectionConfig::default(), SerialPortConnector::new());
//!     let (connection, events) = manager.start();
//!
//!     let stores = Collaborators {
//!         users: Arc::new(InMemoryUserDirectory::new()),
//!         settings: Arc::new(InMemorySettings::new()),
//!         access_log: Arc::new(InMemoryAccessLog::new()),
//!     };
//!     let controller =
//!         AccessController::start(AccessConfig::default(), connection, events, stores);
//!
//!     let mut decisions = controller.subscribe([Topic::Decisions]);
//!     while let Some(event) = decisions.recv().await {
//!         println!("{}", event.payload());
//!     }
//! }
//! ```

pub mod broadcast;
pub mod collaborators;
pub mod config;
pub mod debounce;
pub mod decision;
pub mod error;
pub mod gate;
pub mod memory;
pub mod service;

pub use broadcast::{BroadcastEvent, EventBroadcaster, Subscription, Topic};
pub use collaborators::{AccessLogStore, RealtimeSink, SettingsStore, UserDirectory};
pub use config::{ConfigError, GatekeepConfig};
pub use debounce::ScanDebouncer;
pub use decision::{AccessDecision, AccessReason, decide};
pub use error::{AccessError, Result};
pub use gate::{
    Gate, GateAction, GateLocked, GateState, GateStateMachine, GateTransition, TransitionSource,
};
pub use service::{AccessConfig, AccessController, Collaborators, CommandDelivery, GateControl};
