//! Gate state machine.
//!
//! This module owns the state of the physical gate and its auto-relock
//! timing.
//!
//! # States
//!
//! - `Closed`: initial state, the gate is shut
//! - `Open`: the gate is open and an auto-relock timer is armed
//! - `Locked`: lockdown, the gate refuses to open until unlocked
//!
//! # Valid Transitions
//!
//! - Closed → Open (open), arming the relock timer
//! - Open → Open (open again), re-arming the relock timer
//! - Open → Closed (close, or relock timer fired)
//! - Closed/Open → Locked (lock)
//! - Locked → Closed (unlock)
//!
//! Opening a locked gate fails with [`GateLocked`]. Other actions that do
//! not apply to the current state (close while closed, unlock while not
//! locked, lock while locked) are no-ops.
//!
//! # Layers
//!
//! [`GateStateMachine`] is the synchronous rule table with a bounded history.
//! [`Gate`] wraps it for concurrent use: it serializes actions, runs the
//! relock timer and publishes every transition to the [`EventBroadcaster`].
//!
//! # Examples
//!
//! ```
//! use chrono::Utc;
//! use gatekeep_access::gate::{GateAction, GateState, GateStateMachine, TransitionSource};
//!
//! let mut machine = GateStateMachine::new();
//! assert_eq!(machine.state(), GateState::Closed);
//!
//! machine.apply(GateAction::Lock, TransitionSource::Operator, Utc::now()).unwrap();
//! assert!(machine.apply(GateAction::Open, TransitionSource::Operator, Utc::now()).is_err());
//! assert_eq!(machine.state(), GateState::Locked);
//! ```

use crate::broadcast::{BroadcastEvent, EventBroadcaster};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Maximum number of transitions kept in history.
const MAX_HISTORY_SIZE: usize = 100;

/// State of the physical gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Closed,
    Open,
    Locked,
}

impl GateState {
    /// Whether the gate is in lockdown.
    #[inline]
    pub fn is_locked(self) -> bool {
        matches!(self, Self::Locked)
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::Locked => write!(f, "Locked"),
        }
    }
}

/// Action requested on the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    Open,
    Close,
    Lock,
    Unlock,
}

impl fmt::Display for GateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Close => write!(f, "close"),
            Self::Lock => write!(f, "lock"),
            Self::Unlock => write!(f, "unlock"),
        }
    }
}

/// Who triggered an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionSource {
    /// An operator through the HTTP layer.
    Operator,

    /// A granted access decision.
    Decision,

    /// The controller reported a gate movement.
    Controller,

    /// The auto-relock timer fired.
    Relock,
}

/// Error returned when opening a locked gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Gate is locked")]
pub struct GateLocked;

/// A single state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateTransition {
    /// The state transitioned from.
    pub from: GateState,

    /// The state transitioned to.
    pub to: GateState,

    /// The action that caused the transition.
    pub action: GateAction,

    /// Who requested the action.
    pub source: TransitionSource,

    /// When the transition occurred.
    pub at: DateTime<Utc>,
}

/// Rule table for gate transitions.
///
/// This struct is not thread-safe by design; [`Gate`] wraps it in a mutex.
#[derive(Debug, Clone)]
pub struct GateStateMachine {
    state: GateState,
    history: VecDeque<GateTransition>,
}

impl GateStateMachine {
    /// Create a machine in the `Closed` state.
    pub fn new() -> Self {
        Self::with_initial_state(GateState::Closed)
    }

    /// Create a machine in the given state, e.g. when restoring a lockdown.
    pub fn with_initial_state(state: GateState) -> Self {
        Self {
            state,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    /// Current state.
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<GateTransition> {
        &self.history
    }

    /// Apply an action.
    ///
    /// Returns the transition record, or `None` when the action is a no-op
    /// in the current state. Controller reports never fail: while locked
    /// they are ignored, and a reported opening of an already open gate does
    /// not re-arm anything.
    ///
    /// # Errors
    ///
    /// Returns [`GateLocked`] when opening a locked gate on request.
    pub fn apply(
        &mut self,
        action: GateAction,
        source: TransitionSource,
        at: DateTime<Utc>,
    ) -> Result<Option<GateTransition>, GateLocked> {
        use GateAction as A;
        use GateState as S;

        let target = match (self.state, action) {
            (S::Locked, A::Open) if source == TransitionSource::Controller => None,
            (S::Locked, A::Open) => return Err(GateLocked),
            (S::Open, A::Open) if source == TransitionSource::Controller => None,
            (S::Closed | S::Open, A::Open) => Some(S::Open),
            (S::Open, A::Close) => Some(S::Closed),
            (S::Closed | S::Locked, A::Close) => None,
            (S::Closed | S::Open, A::Lock) => Some(S::Locked),
            (S::Locked, A::Lock) => None,
            (S::Locked, A::Unlock) => Some(S::Closed),
            (S::Closed | S::Open, A::Unlock) => None,
        };

        let Some(to) = target else {
            return Ok(None);
        };

        let transition = GateTransition {
            from: self.state,
            to,
            action,
            source,
            at,
        };
        self.state = to;
        self.history.push_back(transition.clone());
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        Ok(Some(transition))
    }
}

impl Default for GateStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct GateCore {
    machine: GateStateMachine,
    relock: Option<JoinHandle<()>>,
    /// Bumped on every transition; a relock timer only fires for the
    /// generation it was armed in.
    generation: u64,
}

#[derive(Debug)]
struct GateInner {
    core: Mutex<GateCore>,
    state_tx: watch::Sender<GateState>,
    broadcaster: EventBroadcaster,
}

/// Shared handle to the gate.
///
/// Cloning is cheap; all clones drive the same gate.
#[derive(Debug, Clone)]
pub struct Gate {
    inner: Arc<GateInner>,
}

impl Gate {
    /// Create a closed gate publishing to `broadcaster`.
    pub fn new(broadcaster: EventBroadcaster) -> Self {
        Self::with_machine(GateStateMachine::new(), broadcaster)
    }

    /// Create a gate around an existing machine.
    pub fn with_machine(machine: GateStateMachine, broadcaster: EventBroadcaster) -> Self {
        let (state_tx, _) = watch::channel(machine.state());
        Self {
            inner: Arc::new(GateInner {
                core: Mutex::new(GateCore {
                    machine,
                    relock: None,
                    generation: 0,
                }),
                state_tx,
                broadcaster,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> GateState {
        *self.inner.state_tx.borrow()
    }

    /// Watch state changes.
    pub fn watch(&self) -> watch::Receiver<GateState> {
        self.inner.state_tx.subscribe()
    }

    /// Recent transitions, oldest first.
    pub async fn history(&self) -> Vec<GateTransition> {
        self.inner.core.lock().await.machine.history().iter().cloned().collect()
    }

    /// Apply an action. `relock_after` is used when the gate ends up open.
    ///
    /// # Errors
    ///
    /// Returns [`GateLocked`] when opening a locked gate on request.
    pub async fn apply(
        &self,
        action: GateAction,
        source: TransitionSource,
        relock_after: Duration,
    ) -> Result<Option<GateTransition>, GateLocked> {
        let mut core = self.inner.core.lock().await;
        let transition = core.machine.apply(action, source, Utc::now())?;
        if let Some(transition) = &transition {
            self.commit(&mut core, transition, relock_after);
        }
        Ok(transition)
    }

    fn commit(&self, core: &mut GateCore, transition: &GateTransition, relock_after: Duration) {
        if let Some(task) = core.relock.take() {
            task.abort();
        }
        core.generation = core.generation.wrapping_add(1);

        if transition.to == GateState::Open {
            core.relock = Some(self.arm_relock(core.generation, relock_after));
        }

        info!(
            from = %transition.from,
            to = %transition.to,
            action = %transition.action,
            source = ?transition.source,
            "Gate transition"
        );
        self.inner.state_tx.send_replace(transition.to);
        self.inner
            .broadcaster
            .publish(BroadcastEvent::Gate(transition.clone()));
    }

    fn arm_relock(&self, generation: u64, delay: Duration) -> JoinHandle<()> {
        let weak: Weak<GateInner> = Arc::downgrade(&self.inner);
        debug!(generation, delay_ms = delay.as_millis() as u64, "Relock timer armed");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Gate { inner }.relock(generation).await;
            }
        })
    }

    async fn relock(&self, generation: u64) {
        let mut core = self.inner.core.lock().await;
        if core.generation != generation {
            debug!(generation, current = core.generation, "Stale relock timer ignored");
            return;
        }

        // Detach our own handle so committing does not abort this task
        core.relock = None;
        if let Ok(Some(transition)) =
            core.machine
                .apply(GateAction::Close, TransitionSource::Relock, Utc::now())
        {
            self.commit(&mut core, &transition, Duration::ZERO);
        }
    }
}
