//! Error types for the access engine.

use crate::gate::GateLocked;

/// Result type alias for access engine operations.
pub type Result<T> = std::result::Result<T, AccessError>;

/// Errors raised by the access engine and its collaborators.
///
/// None of these are fatal: collaborator failures are logged and the
/// engine carries on with the safe outcome.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The gate is locked and cannot be opened.
    #[error(transparent)]
    GateLocked(#[from] GateLocked),

    /// The user directory could not be queried.
    #[error("User lookup failed: {0}")]
    LookupFailed(String),

    /// The user directory did not answer in time.
    #[error("User lookup timed out after {timeout_ms}ms")]
    LookupTimeout { timeout_ms: u64 },

    /// An access log row could not be written.
    #[error("Failed to persist access log: {0}")]
    PersistenceFailed(String),

    /// Invalid input such as a malformed tag.
    #[error(transparent)]
    Core(#[from] gatekeep_core::Error),
}

impl AccessError {
    /// Create a new lookup failed error.
    pub fn lookup_failed(message: impl Into<String>) -> Self {
        Self::LookupFailed(message.into())
    }

    /// Create a new persistence failed error.
    pub fn persistence_failed(message: impl Into<String>) -> Self {
        Self::PersistenceFailed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            AccessError::lookup_failed("connection refused").to_string(),
            "User lookup failed: connection refused"
        );
        assert_eq!(
            AccessError::LookupTimeout { timeout_ms: 2000 }.to_string(),
            "User lookup timed out after 2000ms"
        );
        assert_eq!(
            AccessError::GateLocked(GateLocked).to_string(),
            "Gate is locked"
        );
    }

    #[test]
    fn test_core_error_conversion() {
        let err: AccessError = gatekeep_core::TagId::new("").unwrap_err().into();
        assert!(matches!(err, AccessError::Core(_)));
    }
}
