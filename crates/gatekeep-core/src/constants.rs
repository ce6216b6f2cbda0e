//! Core constants for the gate controller line protocol and the access engine.
//!
//! The controller speaks a newline-delimited text protocol over a serial
//! link. Structured events from the controller carry a fixed marker followed
//! by a JSON object; commands from the backend are colon-delimited tokens.
//!
//! ```text
//! device → backend:  BACKEND_DATA:{"event":"CARD_SCANNED","cardID":"D0D39925"}\n
//! backend → device:  ACCESS_GRANTED:D0D39925:5\n
//! ```
//!
//! # Usage
//!
//! ```
//! use gatekeep_core::constants::*;
//!
//! assert_eq!(BACKEND_DATA_MARKER, "BACKEND_DATA:");
//!
//! use std::time::Duration;
//! let cooldown = Duration::from_millis(DEFAULT_COOLDOWN_MS);
//! assert_eq!(cooldown.as_secs(), 3);
//! ```

// ============================================================================
// Line Protocol
// ============================================================================

/// Prefix that marks a controller line as a structured event payload.
///
/// Lines without this prefix are free-text diagnostics printed by the
/// controller firmware.
pub const BACKEND_DATA_MARKER: &str = "BACKEND_DATA:";

/// Separator between a command name and its parameters.
///
/// # Examples
///
/// ```
/// use gatekeep_core::constants::COMMAND_DELIMITER;
///
/// let line = "ACCESS_GRANTED:ABCD1234:8";
/// let parts: Vec<&str> = line.split(COMMAND_DELIMITER).collect();
/// assert_eq!(parts, vec!["ACCESS_GRANTED", "ABCD1234", "8"]);
/// ```
pub const COMMAND_DELIMITER: char = ':';

/// Line terminator for both directions.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Maximum accepted length of a single line, in bytes.
///
/// Longer lines are discarded by the framing layer; the controller never
/// emits anything close to this size.
pub const MAX_LINE_LENGTH: usize = 4096;

// ============================================================================
// Serial Link
// ============================================================================

/// Baud rate the controller firmware is flashed with.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Interval between reconnect attempts while the link is down (seconds).
pub const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 5;

/// Read timeout applied to the opened port (milliseconds).
///
/// The reader thread wakes up at this rate to notice that its consumer
/// has gone away.
pub const SERIAL_READ_TIMEOUT_MS: u64 = 100;

/// USB descriptor substrings identifying a known controller board.
///
/// Matched case-insensitively against manufacturer and product strings.
pub const CONTROLLER_SIGNATURES: &[&str] = &[
    "arduino",
    "wch",
    "ch340",
    "ftdi",
    "silicon labs",
    "cp210",
];

/// Device path fragments used by USB serial adapters on Linux and macOS.
pub const CONTROLLER_PATH_PATTERNS: &[&str] =
    &["ttyUSB", "ttyACM", "cu.usbmodem", "cu.usbserial"];

// ============================================================================
// Access Engine
// ============================================================================

/// Per-tag cooldown window (milliseconds).
///
/// A second scan of the same tag inside this window is dropped.
pub const DEFAULT_COOLDOWN_MS: u64 = 3000;

/// Cooldown entries older than this many windows are eligible for sweeping.
pub const STALE_COOLDOWN_WINDOWS: u32 = 10;

/// Registry size above which an accepted scan triggers a sweep.
pub const COOLDOWN_SWEEP_THRESHOLD: usize = 1024;

/// Auto-relock delay used when the settings store has no value (seconds).
pub const DEFAULT_AUTO_LOCK_SECONDS: u64 = 5;

/// Settings key holding the auto-relock delay in seconds.
pub const SETTING_AUTO_LOCK_DELAY: &str = "autoLockDelay";

/// Upper bound on a user lookup before the scan is treated as unknown (milliseconds).
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 2000;

/// Capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// ============================================================================
// Tag Validation
// ============================================================================

/// Minimum tag length after normalization.
pub const MIN_TAG_LENGTH: usize = 1;

/// Maximum tag length after normalization.
///
/// Common UIDs are 4, 7 or 10 bytes (8, 14 or 20 hex characters).
pub const MAX_TAG_LENGTH: usize = 32;
