//! Mock transport for testing and development.
//!
//! This module provides a simulated controller link that can be driven
//! programmatically without a physical controller attached.

pub mod serial;

pub use serial::{MockConnector, MockControllerHandle, MockWriter};
