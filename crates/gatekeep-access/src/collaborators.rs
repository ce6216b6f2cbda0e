//! Interfaces to the systems around the engine.
//!
//! User, setting and log storage and the realtime transport live outside
//! this workspace. The engine only consumes them through these traits. The
//! futures are required to be `Send` so that calls can run on spawned tasks.
//!
//! In-memory implementations live in [`crate::memory`].

use crate::broadcast::Topic;
use crate::decision::AccessDecision;
use crate::error::Result;
use gatekeep_core::{DeviceRef, TagId, UserRecord};
use std::future::Future;

/// Directory mapping tags to users.
pub trait UserDirectory: Send + Sync {
    /// Look up the user registered for `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AccessError::LookupFailed`] if the directory cannot
    /// be queried.
    fn find_user_by_tag(
        &self,
        tag: &TagId,
    ) -> impl Future<Output = Result<Option<UserRecord>>> + Send;
}

/// Key/value settings store.
pub trait SettingsStore: Send + Sync {
    /// Read a setting. `Ok(None)` means the key is not set.
    fn get_setting(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// Sink for access log rows.
pub trait AccessLogStore: Send + Sync {
    /// Persist one decision.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AccessError::PersistenceFailed`] if the row cannot be
    /// written. The engine logs the failure and moves on.
    fn persist_access_log(
        &self,
        decision: &AccessDecision,
        device: &DeviceRef,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Realtime transport towards live dashboards.
pub trait RealtimeSink: Send + Sync {
    /// Emit one event payload under `topic`.
    fn emit_realtime(
        &self,
        topic: Topic,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<()>> + Send;
}
