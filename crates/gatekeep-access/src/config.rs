//! Layered configuration.
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file,
//! then `GATEKEEP_`-prefixed environment variables with `__` separating
//! nesting levels (`GATEKEEP_SERIAL__PORT=/dev/ttyUSB1`).
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyACM0"
//! baud_rate = 9600
//!
//! [access]
//! cooldown_ms = 3000
//!
//! [[users]]
//! tag = "D0D39925"
//! id = "1"
//! name = "Ana Souza"
//! ```

use crate::service::AccessConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use gatekeep_core::constants::{
    CONTROLLER_PATH_PATTERNS, CONTROLLER_SIGNATURES, DEFAULT_AUTO_LOCK_SECONDS, DEFAULT_BAUD_RATE,
    DEFAULT_COOLDOWN_MS, DEFAULT_EVENT_CAPACITY, DEFAULT_LOOKUP_TIMEOUT_MS,
    DEFAULT_RECONNECT_INTERVAL_SECS,
};
use gatekeep_core::{TagId, UserRecord};
use gatekeep_hardware::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "GATEKEEP_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("invalid user entry: {0}")]
    User(#[from] gatekeep_core::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

// ── Config structs ──────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatekeepConfig {
    #[serde(default)]
    pub serial: SerialSettings,

    #[serde(default)]
    pub access: AccessSettings,

    /// Static user directory for the daemon.
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Explicit port path; discovery is used when absent.
    #[serde(default)]
    pub port: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,

    /// USB descriptor substrings identifying the controller.
    #[serde(default = "default_signatures")]
    pub signatures: Vec<String>,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            signatures: default_signatures(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSettings {
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Relock delay used when the `autoLockDelay` setting is absent.
    #[serde(default = "default_auto_lock_seconds")]
    pub default_auto_lock_seconds: u64,

    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Per-subscriber buffer of the event broadcaster.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            default_auto_lock_seconds: default_auto_lock_seconds(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// One statically configured user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub tag: String,
    pub id: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
fn default_reconnect_interval_secs() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_SECS
}
fn default_signatures() -> Vec<String> {
    CONTROLLER_SIGNATURES.iter().map(|s| s.to_string()).collect()
}
fn default_cooldown_ms() -> u64 {
    DEFAULT_COOLDOWN_MS
}
fn default_auto_lock_seconds() -> u64 {
    DEFAULT_AUTO_LOCK_SECONDS
}
fn default_lookup_timeout_ms() -> u64 {
    DEFAULT_LOOKUP_TIMEOUT_MS
}
fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}
fn default_active() -> bool {
    true
}

// ── Loading ─────────────────────────────────────────────────────────

impl GatekeepConfig {
    /// Build the layered provider: defaults, then `path` if given, then env.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(GatekeepConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a source cannot be parsed or validation
    /// fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(path))
    }

    /// Extract and validate configuration from a prepared provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on extraction or validation failure.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: GatekeepConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::validation("serial.baud_rate", "must be greater than zero"));
        }
        if self.serial.reconnect_interval_secs == 0 {
            return Err(ConfigError::validation(
                "serial.reconnect_interval_secs",
                "must be greater than zero",
            ));
        }
        if self.access.cooldown_ms == 0 {
            return Err(ConfigError::validation("access.cooldown_ms", "must be greater than zero"));
        }
        if self.access.event_capacity == 0 {
            return Err(ConfigError::validation(
                "access.event_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Settings for the connection manager.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            port: self.serial.port.clone(),
            baud_rate: self.serial.baud_rate,
            reconnect_interval: Duration::from_secs(self.serial.reconnect_interval_secs),
            signatures: self.serial.signatures.clone(),
            path_patterns: CONTROLLER_PATH_PATTERNS.iter().map(|s| s.to_string()).collect(),
            event_capacity: self.access.event_capacity,
        }
    }

    /// Settings for the access controller.
    pub fn access_config(&self) -> AccessConfig {
        AccessConfig {
            cooldown: Duration::from_millis(self.access.cooldown_ms),
            default_auto_lock: Duration::from_secs(self.access.default_auto_lock_seconds),
            lookup_timeout: Duration::from_millis(self.access.lookup_timeout_ms),
            event_capacity: self.access.event_capacity,
        }
    }

    /// Statically configured users keyed by normalized tag.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::User`] for an invalid tag.
    pub fn directory_entries(&self) -> Result<Vec<(TagId, UserRecord)>, ConfigError> {
        self.users
            .iter()
            .map(|entry| -> Result<(TagId, UserRecord), ConfigError> {
                let tag = TagId::new(&entry.tag)?;
                let user = UserRecord::new(&entry.id, &entry.name).with_active(entry.active);
                Ok((tag, user))
            })
            .collect()
    }
}
