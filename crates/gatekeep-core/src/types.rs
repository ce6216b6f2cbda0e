use crate::{
    Result,
    constants::{COMMAND_DELIMITER, MAX_TAG_LENGTH, MIN_TAG_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// RFID tag identifier.
///
/// # Security
/// This type implements constant-time comparison to prevent timing attacks
/// when comparing tags during identity lookup.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagId(String);

impl TagId {
    /// Create a new tag identifier with validation.
    ///
    /// The tag is normalized (trimmed and converted to uppercase) before validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidTagFormat` if:
    /// - The normalized length is not between 1-32 characters
    /// - The tag contains non-ASCII characters, whitespace or the command delimiter
    pub fn new(tag: &str) -> Result<Self> {
        // Normalize: trim and uppercase
        let tag = tag.trim().to_uppercase();

        let len = tag.len();
        if !(MIN_TAG_LENGTH..=MAX_TAG_LENGTH).contains(&len) {
            return Err(Error::InvalidTagFormat(format!(
                "Tag must be {MIN_TAG_LENGTH}-{MAX_TAG_LENGTH} chars, got {len}"
            )));
        }

        if !tag.is_ascii() {
            return Err(Error::InvalidTagFormat("Tag must be ASCII".to_string()));
        }

        // The tag is embedded in colon-delimited command lines
        if tag
            .chars()
            .any(|c| c == COMMAND_DELIMITER || c.is_ascii_whitespace() || c.is_ascii_control())
        {
            return Err(Error::InvalidTagFormat(format!(
                "Tag contains a reserved character: {tag}"
            )));
        }

        Ok(TagId(tag))
    }

    /// Get the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TagId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TagId::new(s)
    }
}

impl TryFrom<String> for TagId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        TagId::new(&value)
    }
}

impl From<TagId> for String {
    fn from(tag: TagId) -> Self {
        tag.0
    }
}

/// Constant-time comparison implementation for TagId
impl PartialEq for TagId {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for TagId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Direction of passage through the gate.
///
/// Kept apart from the decision outcome so that "denied on exit" is a
/// reason plus a direction rather than a status string of its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessDirection {
    #[default]
    Entry,
    Exit,
}

impl AccessDirection {
    /// Returns `true` if direction is Entry.
    #[inline]
    #[must_use]
    pub fn is_entry(self) -> bool {
        matches!(self, AccessDirection::Entry)
    }

    /// Returns `true` if direction is Exit.
    #[inline]
    #[must_use]
    pub fn is_exit(self) -> bool {
        matches!(self, AccessDirection::Exit)
    }
}

impl fmt::Display for AccessDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AccessDirection::Entry => write!(f, "entry"),
            AccessDirection::Exit => write!(f, "exit"),
        }
    }
}

impl std::str::FromStr for AccessDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" | "in" => Ok(AccessDirection::Entry),
            "exit" | "out" => Ok(AccessDirection::Exit),
            other => Err(Error::InvalidDirection(other.to_string())),
        }
    }
}

/// User record as returned by the external user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Opaque identifier in the user store.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Inactive accounts are always denied.
    pub active: bool,
}

impl UserRecord {
    /// Create a new active user record.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            active: true,
        }
    }

    /// Set the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Reference to this user for embedding in decisions.
    #[must_use]
    pub fn to_ref(&self) -> UserRef {
        UserRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Opaque identity reference carried by an access decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}

/// Operational status of an access device as reported by the device registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Maintenance,
}

impl DeviceStatus {
    /// Only online devices may grant access.
    #[inline]
    #[must_use]
    pub fn is_online(self) -> bool {
        matches!(self, DeviceStatus::Online)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceStatus::Online => write!(f, "online"),
            DeviceStatus::Offline => write!(f, "offline"),
            DeviceStatus::Maintenance => write!(f, "maintenance"),
        }
    }
}

impl std::str::FromStr for DeviceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(DeviceStatus::Online),
            "offline" => Ok(DeviceStatus::Offline),
            "maintenance" => Ok(DeviceStatus::Maintenance),
            other => Err(Error::InvalidDeviceStatus(other.to_string())),
        }
    }
}

/// Reference to the device a scan originated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    /// Identifier in the device registry, or the serial port path for the
    /// locally attached controller.
    pub id: String,

    /// Status as known when the scan was submitted.
    pub status: DeviceStatus,

    /// Direction of passage served by this device.
    #[serde(default)]
    pub direction: AccessDirection,
}

impl DeviceRef {
    /// Create a device reference serving the entry direction.
    pub fn new(id: impl Into<String>, status: DeviceStatus) -> Self {
        Self {
            id: id.into(),
            status,
            direction: AccessDirection::Entry,
        }
    }

    /// Set the direction served by this device.
    pub fn with_direction(mut self, direction: AccessDirection) -> Self {
        self.direction = direction;
        self
    }
}
