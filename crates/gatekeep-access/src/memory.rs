//! In-memory collaborators.
//!
//! These back the `gatekeepd` daemon when no external store is wired in, and
//! the tests.

use crate::broadcast::Topic;
use crate::collaborators::{AccessLogStore, RealtimeSink, SettingsStore, UserDirectory};
use crate::decision::AccessDecision;
use crate::error::{AccessError, Result};
use gatekeep_core::{DeviceRef, TagId, UserRecord};
use std::collections::HashMap;
use tokio::sync::{RwLock, watch};
use tracing::info;

/// User directory held in a map.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<TagId, UserRecord>>,
}

impl InMemoryUserDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory from `(tag, user)` pairs.
    pub fn with_users(users: impl IntoIterator<Item = (TagId, UserRecord)>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().collect()),
        }
    }

    /// Register or replace the user for `tag`.
    pub async fn insert(&self, tag: TagId, user: UserRecord) {
        self.users.write().await.insert(tag, user);
    }

    /// Remove the user registered for `tag`.
    pub async fn remove(&self, tag: &TagId) -> Option<UserRecord> {
        self.users.write().await.remove(tag)
    }

    /// Number of registered tags.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// Whether no tag is registered.
    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    async fn find_user_by_tag(&self, tag: &TagId) -> Result<Option<UserRecord>> {
        Ok(self.users.read().await.get(tag).cloned())
    }
}

/// Settings held in a map.
#[derive(Debug, Default)]
pub struct InMemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl InMemorySettings {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value.
    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().await.insert(key.into(), value.into());
    }
}

impl SettingsStore for InMemorySettings {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }
}

/// One persisted decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessLogEntry {
    pub decision: AccessDecision,
    pub device: DeviceRef,
}

/// Access log held in a vector.
#[derive(Debug)]
pub struct InMemoryAccessLog {
    entries: RwLock<Vec<AccessLogEntry>>,
    count_tx: watch::Sender<usize>,
    fail_with: RwLock<Option<String>>,
}

impl Default for InMemoryAccessLog {
    fn default() -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            entries: RwLock::new(Vec::new()),
            count_tx,
            fail_with: RwLock::new(None),
        }
    }
}

impl InMemoryAccessLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, oldest first.
    pub async fn entries(&self) -> Vec<AccessLogEntry> {
        self.entries.read().await.clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        *self.count_tx.borrow()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` entries were persisted.
    pub async fn wait_for_len(&self, count: usize) {
        let mut rx = self.count_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|len| *len >= count).await;
    }

    /// Make subsequent writes fail (`None` clears the failure).
    pub async fn set_failure(&self, message: Option<&str>) {
        *self.fail_with.write().await = message.map(str::to_string);
    }
}

impl AccessLogStore for InMemoryAccessLog {
    async fn persist_access_log(
        &self,
        decision: &AccessDecision,
        device: &DeviceRef,
    ) -> Result<()> {
        if let Some(message) = self.fail_with.read().await.as_deref() {
            return Err(AccessError::persistence_failed(message));
        }

        let mut entries = self.entries.write().await;
        entries.push(AccessLogEntry {
            decision: decision.clone(),
            device: device.clone(),
        });
        self.count_tx.send_replace(entries.len());
        Ok(())
    }
}

/// Realtime sink that writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRealtimeSink;

impl RealtimeSink for TracingRealtimeSink {
    async fn emit_realtime(&self, topic: Topic, payload: serde_json::Value) -> Result<()> {
        info!(target: "gatekeep::realtime", %topic, %payload, "Realtime event");
        Ok(())
    }
}
