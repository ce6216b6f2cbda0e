//! Real-time fan-out of engine events.
//!
//! Decisions, gate transitions, connection changes and controller diagnostic
//! lines are published on one `tokio::sync::broadcast` channel. Subscribers
//! choose the topics they care about. Publishing never blocks: with no
//! subscriber the event is dropped, and a subscriber that falls behind skips
//! what it missed.

use crate::collaborators::RealtimeSink;
use crate::decision::AccessDecision;
use crate::gate::GateTransition;
use chrono::{DateTime, Utc};
use gatekeep_core::DeviceRef;
use gatekeep_hardware::ConnectionState;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Category of a broadcast event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Decisions,
    GateState,
    ConnectionState,
    DeviceLog,
}

impl Topic {
    /// Every topic.
    pub const ALL: [Topic; 4] = [
        Topic::Decisions,
        Topic::GateState,
        Topic::ConnectionState,
        Topic::DeviceLog,
    ];

    /// Wire name of the topic.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decisions => "decisions",
            Self::GateState => "gate_state",
            Self::ConnectionState => "connection_state",
            Self::DeviceLog => "device_log",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    /// An access decision and the device it was made for.
    Decision {
        decision: AccessDecision,
        device: DeviceRef,
    },

    /// A gate state transition.
    Gate(GateTransition),

    /// The controller link changed state.
    Connection {
        state: ConnectionState,
        port: Option<String>,
        at: DateTime<Utc>,
    },

    /// A diagnostic line printed by the controller.
    DeviceLog { line: String, at: DateTime<Utc> },
}

impl BroadcastEvent {
    /// Topic the event is published under.
    pub fn topic(&self) -> Topic {
        match self {
            Self::Decision { .. } => Topic::Decisions,
            Self::Gate(_) => Topic::GateState,
            Self::Connection { .. } => Topic::ConnectionState,
            Self::DeviceLog { .. } => Topic::DeviceLog,
        }
    }

    /// JSON payload handed to realtime sinks.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            warn!(error = %e, topic = %self.topic(), "Failed to serialize event");
            serde_json::Value::Null
        })
    }
}

/// Publisher side of the fan-out. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<Arc<BroadcastEvent>>,
}

impl EventBroadcaster {
    /// Create a broadcaster buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns the number of receivers it reached.
    pub fn publish(&self, event: BroadcastEvent) -> usize {
        let topic = event.topic();
        match self.tx.send(Arc::new(event)) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(%topic, "No subscribers, event dropped");
                0
            }
        }
    }

    /// Subscribe to the given topics. Only events published afterwards are
    /// delivered.
    pub fn subscribe(&self, topics: impl IntoIterator<Item = Topic>) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            topics: topics.into_iter().collect(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Relay every event to an external realtime sink.
    ///
    /// The relay runs in its own task, so a slow sink never delays the
    /// publisher. Sink errors are logged and the relay continues. The task
    /// ends when every broadcaster clone is dropped.
    pub fn forward_to<S>(&self, sink: Arc<S>) -> JoinHandle<()>
    where
        S: RealtimeSink + 'static,
    {
        let mut subscription = self.subscribe(Topic::ALL);
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let topic = event.topic();
                if let Err(e) = sink.emit_realtime(topic, event.payload()).await {
                    warn!(%topic, error = %e, "Realtime emission failed");
                }
            }
        })
    }
}

/// Topic-filtered receiver.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Arc<BroadcastEvent>>,
    topics: HashSet<Topic>,
}

impl Subscription {
    /// Receive the next event on a subscribed topic.
    ///
    /// Returns `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<Arc<BroadcastEvent>> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.topics.contains(&event.topic()) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged, events skipped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Receive a pending event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<BroadcastEvent>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.topics.contains(&event.topic()) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged, events skipped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Topics this subscription receives.
    pub fn topics(&self) -> &HashSet<Topic> {
        &self.topics
    }
}
