//! The access controller.
//!
//! [`AccessController`] ties the pieces together. It consumes the connection
//! manager's events in a single processing loop:
//!
//! ```text
//! ConnectionEvents ──► CARD_SCANNED ──► ScanDebouncer ──► user lookup ──► decide
//!                                                                          │
//!        ┌──────────────────────────────┬──────────────────────────┬───────┘
//!        ▼                              ▼                          ▼
//!  ACCESS_GRANTED / ACCESS_DENIED   EventBroadcaster        AccessLogStore
//!  (controller command)             (Decisions topic)       (spawned, best effort)
//! ```
//!
//! Each event is handled to completion before the next one, which keeps
//! decisions for one tag in scan order. The same controller also serves the
//! HTTP layer through [`AccessController::submit_scan`] and
//! [`AccessController::control_gate`].

use crate::broadcast::{BroadcastEvent, EventBroadcaster, Subscription, Topic};
use crate::collaborators::{AccessLogStore, SettingsStore, UserDirectory};
use crate::debounce::ScanDebouncer;
use crate::decision::{AccessDecision, decide};
use crate::error::AccessError;
use crate::gate::{Gate, GateAction, GateLocked, GateState, TransitionSource};
use chrono::Utc;
use gatekeep_core::constants::{
    DEFAULT_AUTO_LOCK_SECONDS, DEFAULT_COOLDOWN_MS, DEFAULT_EVENT_CAPACITY,
    DEFAULT_LOOKUP_TIMEOUT_MS, SETTING_AUTO_LOCK_DELAY,
};
use gatekeep_core::{DeviceRef, DeviceStatus, TagId, UserRecord};
use gatekeep_hardware::{ConnectionEvent, ConnectionEvents, ConnectionHandle, ConnectionState};
use gatekeep_protocol::{DeviceCommand, DeviceEvent, DeviceLine};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

/// Device id used for the serial controller before a port is known.
pub const SERIAL_DEVICE_ID: &str = "serial-controller";

/// Runtime settings of the access controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessConfig {
    /// Per-tag scan cooldown.
    pub cooldown: Duration,

    /// Relock delay when the `autoLockDelay` setting is absent or invalid.
    pub default_auto_lock: Duration,

    /// Upper bound on user directory and settings calls.
    pub lookup_timeout: Duration,

    /// Per-subscriber buffer of the event broadcaster.
    pub event_capacity: usize,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            default_auto_lock: Duration::from_secs(DEFAULT_AUTO_LOCK_SECONDS),
            lookup_timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Whether an operator action reached the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandDelivery {
    /// The action needs no controller command (lock, unlock or a no-op).
    NotRequired,

    /// The command was queued on the open link.
    Sent,

    /// The controller is not connected. Nothing was sent.
    Unreachable,
}

/// Outcome of [`AccessController::control_gate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateControl {
    /// Gate state after the action.
    pub state: GateState,

    /// What happened to the controller command.
    pub delivery: CommandDelivery,
}

impl GateControl {
    /// Returns `false` when the controller could not be reached.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.delivery != CommandDelivery::Unreachable
    }
}

/// External stores consumed by the controller.
#[derive(Debug)]
pub struct Collaborators<U, S, L> {
    pub users: Arc<U>,
    pub settings: Arc<S>,
    pub access_log: Arc<L>,
}

impl<U, S, L> Clone for Collaborators<U, S, L> {
    fn clone(&self) -> Self {
        Self {
            users: Arc::clone(&self.users),
            settings: Arc::clone(&self.settings),
            access_log: Arc::clone(&self.access_log),
        }
    }
}

struct Inner<U, S, L> {
    config: AccessConfig,
    stores: Collaborators<U, S, L>,
    gate: Gate,
    broadcaster: EventBroadcaster,
    connection: ConnectionHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the running access engine. Cloning is cheap.
pub struct AccessController<U, S, L> {
    inner: Arc<Inner<U, S, L>>,
}

impl<U, S, L> Clone for AccessController<U, S, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<U, S, L> AccessController<U, S, L>
where
    U: UserDirectory + 'static,
    S: SettingsStore + 'static,
    L: AccessLogStore + 'static,
{
    /// Start the processing loop over a running connection manager.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: AccessConfig,
        connection: ConnectionHandle,
        events: ConnectionEvents,
        stores: Collaborators<U, S, L>,
    ) -> Self {
        let broadcaster = EventBroadcaster::new(config.event_capacity);
        let gate = Gate::new(broadcaster.clone());
        let gate_events = broadcaster.subscribe([Topic::GateState]);

        let inner = Arc::new(Inner {
            config,
            stores,
            gate,
            broadcaster,
            connection,
            task: Mutex::new(None),
        });

        let task = tokio::spawn(Arc::clone(&inner).run(events, gate_events));
        *inner.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        info!("Access controller started");
        Self { inner }
    }

    /// Decide a scan reported by a device through the HTTP layer.
    ///
    /// Not debounced. Availability is the device's registry status and the
    /// gate not being locked. No controller command is issued; an
    /// unreachable device shows up as [`crate::AccessReason::DeviceUnavailable`].
    pub async fn submit_scan(&self, tag: TagId, device: DeviceRef) -> AccessDecision {
        self.inner.submit_scan(tag, device).await
    }

    /// Apply an operator action to the gate.
    ///
    /// `Open` and `Close` move the physical gate through `OPEN_GATE` /
    /// `CLOSE_GATE`. While the controller is not connected they leave the
    /// gate untouched and report [`CommandDelivery::Unreachable`]. `Lock` and
    /// `Unlock` only change the backend policy and always apply.
    ///
    /// # Errors
    ///
    /// Returns [`GateLocked`] when opening a locked gate.
    pub async fn control_gate(&self, action: GateAction) -> Result<GateControl, GateLocked> {
        self.inner.control_gate(action).await
    }

    /// Current gate state.
    pub fn gate_state(&self) -> GateState {
        self.inner.gate.state()
    }

    /// Current controller link state.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Subscribe to live events.
    pub fn subscribe(&self, topics: impl IntoIterator<Item = Topic>) -> Subscription {
        self.inner.broadcaster.subscribe(topics)
    }

    /// The broadcaster, e.g. to attach a realtime sink with
    /// [`EventBroadcaster::forward_to`].
    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.inner.broadcaster
    }

    /// The gate.
    pub fn gate(&self) -> &Gate {
        &self.inner.gate
    }

    /// Stop the connection manager and wait for the processing loop to
    /// drain.
    pub async fn shutdown(&self) {
        self.inner.connection.shutdown().await;
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Access processing loop failed");
        }
        info!("Access controller stopped");
    }
}

impl<U, S, L> Inner<U, S, L>
where
    U: UserDirectory + 'static,
    S: SettingsStore + 'static,
    L: AccessLogStore + 'static,
{
    async fn run(self: Arc<Self>, mut events: ConnectionEvents, mut gate_events: Subscription) {
        let mut debouncer = ScanDebouncer::new(self.config.cooldown);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_connection_event(event, &mut debouncer).await,
                    None => break,
                },
                Some(event) = gate_events.recv() => self.handle_gate_event(&event),
            }
        }

        debug!("Access processing loop finished");
    }

    async fn handle_connection_event(&self, event: ConnectionEvent, debouncer: &mut ScanDebouncer) {
        match event {
            ConnectionEvent::Line(DeviceLine::Event(event)) => {
                self.handle_device_event(event, debouncer).await;
            }
            ConnectionEvent::Line(DeviceLine::Diagnostic(line)) => {
                debug!(%line, "Controller diagnostic");
                self.broadcaster.publish(BroadcastEvent::DeviceLog {
                    line,
                    at: Utc::now(),
                });
            }
            ConnectionEvent::StateChanged { state, port } => {
                info!(
                    %state,
                    port = port.as_deref().unwrap_or("-"),
                    "Controller link state changed"
                );
                self.broadcaster.publish(BroadcastEvent::Connection {
                    state,
                    port,
                    at: Utc::now(),
                });
            }
            other => debug!(?other, "Ignoring connection event"),
        }
    }

    async fn handle_device_event(&self, event: DeviceEvent, debouncer: &mut ScanDebouncer) {
        match event {
            DeviceEvent::CardScanned { tag } => {
                if debouncer.accept(&tag, Instant::now()) {
                    self.process_serial_scan(tag).await;
                } else {
                    debug!(%tag, "Duplicate scan within cooldown");
                }
            }
            DeviceEvent::SystemReady => info!("Controller reports system ready"),
            DeviceEvent::AccessGranted { tag } => debug!(%tag, "Controller acknowledged grant"),
            DeviceEvent::AccessDenied { tag } => debug!(%tag, "Controller acknowledged denial"),
            DeviceEvent::GateOpened => {
                let delay = self.auto_lock_delay().await;
                self.reconcile_gate(GateAction::Open, delay).await;
            }
            DeviceEvent::GateClosed => self.reconcile_gate(GateAction::Close, Duration::ZERO).await,
            DeviceEvent::Unknown { raw } => debug!(%raw, "Unrecognized controller event dropped"),
        }
    }

    fn handle_gate_event(&self, event: &BroadcastEvent) {
        // The controller only learns about backend relocks through a command
        if let BroadcastEvent::Gate(transition) = event
            && transition.source == TransitionSource::Relock
            && self.connection.state() == ConnectionState::Connected
        {
            self.send(DeviceCommand::CloseGate);
        }
    }

    async fn reconcile_gate(&self, action: GateAction, relock_after: Duration) {
        if let Err(e) = self
            .gate
            .apply(action, TransitionSource::Controller, relock_after)
            .await
        {
            warn!(%action, error = %e, "Controller gate report rejected");
        }
    }

    async fn process_serial_scan(&self, tag: TagId) -> AccessDecision {
        let user = self.lookup(&tag).await;

        let status = self.connection.status();
        let connected = status.state == ConnectionState::Connected;
        let available = connected && !self.gate.state().is_locked();
        let device = DeviceRef::new(
            status.port.unwrap_or_else(|| SERIAL_DEVICE_ID.to_string()),
            if connected {
                DeviceStatus::Online
            } else {
                DeviceStatus::Offline
            },
        );

        let mut decision = decide(&tag, user.as_ref(), available, device.direction, Utc::now());

        if decision.granted {
            let delay = self.auto_lock_delay().await;
            // The gate may have been locked while the delay was read
            match self
                .gate
                .apply(GateAction::Open, TransitionSource::Decision, delay)
                .await
            {
                Ok(_) => {
                    self.send(DeviceCommand::AccessGranted {
                        tag: tag.clone(),
                        auto_lock_seconds: delay.as_secs(),
                    });
                }
                Err(e) => {
                    warn!(%tag, error = %e, "Gate locked before the grant was issued");
                    decision = decide(&tag, user.as_ref(), false, device.direction, Utc::now());
                }
            }
        }

        if !decision.granted {
            self.send(DeviceCommand::AccessDenied { tag });
        }

        self.record(&decision, device);
        decision
    }

    async fn submit_scan(&self, tag: TagId, device: DeviceRef) -> AccessDecision {
        let user = self.lookup(&tag).await;
        let available = device.status.is_online() && !self.gate.state().is_locked();
        let decision = decide(&tag, user.as_ref(), available, device.direction, Utc::now());
        self.record(&decision, device);
        decision
    }

    async fn control_gate(&self, action: GateAction) -> Result<GateControl, GateLocked> {
        let command = match action {
            GateAction::Open => Some(DeviceCommand::OpenGate),
            GateAction::Close => Some(DeviceCommand::CloseGate),
            GateAction::Lock | GateAction::Unlock => None,
        };

        // Open and close only happen through the controller
        if command.is_some() && self.connection.state() != ConnectionState::Connected {
            let state = self.gate.state();
            if action == GateAction::Open && state.is_locked() {
                return Err(GateLocked);
            }
            warn!(%action, %state, "Controller unreachable, gate action not applied");
            return Ok(GateControl {
                state,
                delivery: CommandDelivery::Unreachable,
            });
        }

        let relock_after = match action {
            GateAction::Open => self.auto_lock_delay().await,
            _ => Duration::ZERO,
        };

        let transition = self
            .gate
            .apply(action, TransitionSource::Operator, relock_after)
            .await?;

        let Some(transition) = transition else {
            return Ok(GateControl {
                state: self.gate.state(),
                delivery: CommandDelivery::NotRequired,
            });
        };

        let delivery = match command {
            Some(command) => self.send(command),
            None => CommandDelivery::NotRequired,
        };
        Ok(GateControl {
            state: transition.to,
            delivery,
        })
    }

    /// Queue a command for the controller.
    fn send(&self, command: DeviceCommand) -> CommandDelivery {
        match self.connection.send_command(command) {
            Ok(()) => CommandDelivery::Sent,
            Err(e) => {
                debug!(error = %e, "Controller command not delivered");
                CommandDelivery::Unreachable
            }
        }
    }

    /// Broadcast the decision and persist it in the background.
    fn record(&self, decision: &AccessDecision, device: DeviceRef) {
        info!(
            decision = %decision.id,
            tag = %decision.tag_id,
            granted = decision.granted,
            reason = %decision.reason,
            device = %device.id,
            "Access decision"
        );

        self.broadcaster.publish(BroadcastEvent::Decision {
            decision: decision.clone(),
            device: device.clone(),
        });

        let access_log = Arc::clone(&self.stores.access_log);
        let decision = decision.clone();
        tokio::spawn(async move {
            if let Err(e) = access_log.persist_access_log(&decision, &device).await {
                warn!(decision = %decision.id, error = %e, "Access log not persisted");
            }
        });
    }

    /// Look up the user for `tag`. Failures and timeouts count as unknown.
    async fn lookup(&self, tag: &TagId) -> Option<UserRecord> {
        match timeout(self.config.lookup_timeout, self.stores.users.find_user_by_tag(tag)).await {
            Ok(Ok(user)) => user,
            Ok(Err(e)) => {
                warn!(%tag, error = %e, "User lookup failed, treating tag as unknown");
                None
            }
            Err(_) => {
                let e = AccessError::LookupTimeout {
                    timeout_ms: self.config.lookup_timeout.as_millis() as u64,
                };
                warn!(%tag, error = %e, "User lookup failed, treating tag as unknown");
                None
            }
        }
    }

    /// Relock delay from the `autoLockDelay` setting, in seconds.
    async fn auto_lock_delay(&self) -> Duration {
        let fallback = self.config.default_auto_lock;
        let setting = timeout(
            self.config.lookup_timeout,
            self.stores.settings.get_setting(SETTING_AUTO_LOCK_DELAY),
        )
        .await;

        match setting {
            Ok(Ok(Some(value))) => match value.trim().parse::<u64>() {
                Ok(seconds) => Duration::from_secs(seconds),
                Err(_) => {
                    warn!(%value, "Invalid autoLockDelay setting, using default");
                    fallback
                }
            },
            Ok(Ok(None)) => fallback,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read autoLockDelay, using default");
                fallback
            }
            Err(_) => {
                warn!("Timed out reading autoLockDelay, using default");
                fallback
            }
        }
    }
}
