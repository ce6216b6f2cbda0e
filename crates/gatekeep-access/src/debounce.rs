//! Per-tag scan cooldown.
//!
//! Readers report the same card several times while it sits in the field.
//! The debouncer drops repeats within the cooldown window so that one
//! presentation yields one decision. It is a noise filter, not a security
//! control.

use gatekeep_core::TagId;
use gatekeep_core::constants::{
    COOLDOWN_SWEEP_THRESHOLD, DEFAULT_COOLDOWN_MS, STALE_COOLDOWN_WINDOWS,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Registry of the last accepted scan per tag.
#[derive(Debug)]
pub struct ScanDebouncer {
    cooldown: Duration,
    stale_after: Duration,
    sweep_threshold: usize,
    last_accepted: HashMap<TagId, Instant>,
}

impl Default for ScanDebouncer {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_COOLDOWN_MS))
    }
}

impl ScanDebouncer {
    /// Create a debouncer with the given cooldown.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            stale_after: cooldown * STALE_COOLDOWN_WINDOWS,
            sweep_threshold: COOLDOWN_SWEEP_THRESHOLD,
            last_accepted: HashMap::new(),
        }
    }

    /// Override the registry size that triggers an automatic sweep.
    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold;
        self
    }

    /// Decide whether a scan of `tag` at `now` should be processed.
    ///
    /// A scan within the cooldown of the last accepted scan is rejected and
    /// does not extend the window.
    pub fn accept(&mut self, tag: &TagId, now: Instant) -> bool {
        if let Some(last) = self.last_accepted.get(tag)
            && now.saturating_duration_since(*last) < self.cooldown
        {
            trace!(%tag, "Scan within cooldown, ignored");
            return false;
        }

        self.last_accepted.insert(tag.clone(), now);
        if self.last_accepted.len() > self.sweep_threshold {
            self.sweep(now);
        }
        true
    }

    /// Remove entries whose last accepted scan is older than the stale window.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.last_accepted.len();
        let stale_after = self.stale_after;
        self.last_accepted
            .retain(|_, last| now.saturating_duration_since(*last) < stale_after);
        let removed = before - self.last_accepted.len();
        if removed > 0 {
            debug!(removed, remaining = self.last_accepted.len(), "Swept stale cooldown entries");
        }
        removed
    }

    /// Number of tags currently tracked.
    pub fn len(&self) -> usize {
        self.last_accepted.len()
    }

    /// Whether no tag is tracked.
    pub fn is_empty(&self) -> bool {
        self.last_accepted.is_empty()
    }

    /// Configured cooldown.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
