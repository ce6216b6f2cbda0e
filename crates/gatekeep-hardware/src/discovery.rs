//! Controller discovery.
//!
//! The controller is a USB-serial bridge (Arduino, CH340, FTDI, CP210x...).
//! Discovery prefers an endpoint whose USB descriptor names a known bridge
//! and falls back to the platform's conventional device paths.

use crate::error::{HardwareError, Result};
use crate::traits::SerialConnector;
use crate::types::PortDescriptor;
use tracing::debug;

/// Pick the controller among enumerated endpoints.
///
/// Signature matches (manufacturer or product, case-insensitive substring)
/// win over path matches; within each class the first endpoint wins.
pub fn select_controller_port(
    ports: &[PortDescriptor],
    signatures: &[String],
    path_patterns: &[String],
) -> Option<PortDescriptor> {
    let signatures: Vec<String> = signatures.iter().map(|s| s.to_lowercase()).collect();
    let path_patterns: Vec<String> = path_patterns.iter().map(|p| p.to_lowercase()).collect();

    let by_signature = ports.iter().find(|port| {
        [&port.manufacturer, &port.product]
            .into_iter()
            .flatten()
            .map(|field| field.to_lowercase())
            .any(|field| signatures.iter().any(|sig| field.contains(sig.as_str())))
    });

    by_signature
        .or_else(|| {
            ports.iter().find(|port| {
                let path = port.path.to_lowercase();
                path_patterns.iter().any(|pattern| path.contains(pattern.as_str()))
            })
        })
        .cloned()
}

/// Resolve the port to open.
///
/// An explicitly configured port bypasses enumeration entirely.
///
/// # Errors
///
/// Returns [`HardwareError::DiscoveryFailed`] if enumeration fails or no
/// endpoint matches.
pub fn discover<C: SerialConnector>(
    connector: &C,
    configured: Option<&str>,
    signatures: &[String],
    path_patterns: &[String],
) -> Result<PortDescriptor> {
    if let Some(path) = configured {
        return Ok(PortDescriptor::new(path));
    }

    let ports = connector
        .available_ports()
        .map_err(|e| HardwareError::discovery_failed(e.to_string()))?;

    debug!(count = ports.len(), "Enumerated serial ports");

    select_controller_port(&ports, signatures, path_patterns).ok_or_else(|| {
        HardwareError::discovery_failed(format!(
            "no controller among {} serial port(s)",
            ports.len()
        ))
    })
}
