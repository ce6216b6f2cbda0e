//! Access decision policy.
//!
//! A single pure function decides every scan, whether it came from the
//! serial controller or from a device through the HTTP layer. The rules are
//! checked in order and the first failing rule names the reason.

use chrono::{DateTime, Utc};
use gatekeep_core::{AccessDirection, TagId, UserRecord, UserRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    /// No user is registered for the tag.
    UnknownTag,

    /// The user exists but the account is inactive.
    InactiveAccount,

    /// The device or the gate cannot serve the request.
    DeviceUnavailable,

    /// Access granted.
    Granted,
}

impl AccessReason {
    /// Whether this reason grants access.
    #[inline]
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

impl fmt::Display for AccessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTag => write!(f, "unknown_tag"),
            Self::InactiveAccount => write!(f, "inactive_account"),
            Self::DeviceUnavailable => write!(f, "device_unavailable"),
            Self::Granted => write!(f, "granted"),
        }
    }
}

/// Outcome of one scan.
///
/// Immutable once made; the same record is persisted and broadcast, and
/// `id` correlates the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub id: Uuid,
    pub tag_id: TagId,
    pub granted: bool,
    pub reason: AccessReason,
    pub user: Option<UserRef>,
    pub direction: AccessDirection,
    pub at: DateTime<Utc>,
}

/// Decide a scan.
///
/// Rules, first match wins:
/// 1. no user → [`AccessReason::UnknownTag`]
/// 2. inactive user → [`AccessReason::InactiveAccount`]
/// 3. device or gate unavailable → [`AccessReason::DeviceUnavailable`]
/// 4. otherwise → [`AccessReason::Granted`]
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use gatekeep_access::decision::{AccessReason, decide};
/// use gatekeep_core::{AccessDirection, TagId, UserRecord};
///
/// let tag = TagId::new("D0D39925").unwrap();
/// let user = UserRecord::new("1", "Ana");
///
/// let decision = decide(&tag, Some(&user), true, AccessDirection::Entry, Utc::now());
/// assert!(decision.granted);
/// assert_eq!(decision.reason, AccessReason::Granted);
/// ```
pub fn decide(
    tag: &TagId,
    user: Option<&UserRecord>,
    device_available: bool,
    direction: AccessDirection,
    at: DateTime<Utc>,
) -> AccessDecision {
    let reason = match user {
        None => AccessReason::UnknownTag,
        Some(user) if !user.active => AccessReason::InactiveAccount,
        Some(_) if !device_available => AccessReason::DeviceUnavailable,
        Some(_) => AccessReason::Granted,
    };

    AccessDecision {
        id: Uuid::new_v4(),
        tag_id: tag.clone(),
        granted: reason.is_granted(),
        reason,
        user: user.map(UserRecord::to_ref),
        direction,
        at,
    }
}
