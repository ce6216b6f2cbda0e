//! Shared harness for access engine integration tests.

#![allow(dead_code)]

use gatekeep_access::memory::{InMemoryAccessLog, InMemorySettings, InMemoryUserDirectory};
use gatekeep_access::{AccessConfig, AccessController, Collaborators, SettingsStore, UserDirectory};
use gatekeep_core::{TagId, UserRecord};
use gatekeep_hardware::mock::{MockConnector, MockControllerHandle};
use gatekeep_hardware::{ConnectionConfig, ConnectionState, DeviceConnectionManager};
use gatekeep_protocol::DeviceEvent;
use std::sync::Arc;
use std::time::Duration;

pub const PORT: &str = "/dev/ttyACM0";
pub const ACTIVE_TAG: &str = "D0D39925";
pub const INACTIVE_TAG: &str = "CAFEBABE";
pub const UNKNOWN_TAG: &str = "00000000";

pub struct Harness<U, S = InMemorySettings> {
    pub controller: AccessController<U, S, InMemoryAccessLog>,
    pub device: MockControllerHandle,
    pub users: Arc<U>,
    pub settings: Arc<S>,
    pub log: Arc<InMemoryAccessLog>,
}

pub fn tag(s: &str) -> TagId {
    TagId::new(s).unwrap()
}

pub fn seeded_directory() -> InMemoryUserDirectory {
    InMemoryUserDirectory::with_users([
        (tag(ACTIVE_TAG), UserRecord::new("1", "Ana Souza")),
        (tag(INACTIVE_TAG), UserRecord::new("2", "Bruno Lima").with_active(false)),
    ])
}

/// Engine over a connected mock controller and the seeded directory.
pub async fn harness() -> Harness<InMemoryUserDirectory> {
    harness_with(seeded_directory()).await
}

/// Engine over a connected mock controller and a custom directory.
pub async fn harness_with<U: UserDirectory + 'static>(users: U) -> Harness<U> {
    harness_with_stores(users, InMemorySettings::new()).await
}

/// Engine over a connected mock controller, a custom directory and custom
/// settings.
pub async fn harness_with_stores<U, S>(users: U, settings: S) -> Harness<U, S>
where
    U: UserDirectory + 'static,
    S: SettingsStore + 'static,
{
    let (connector, device) = MockConnector::with_controller(PORT);
    let (connection, events) =
        DeviceConnectionManager::new(ConnectionConfig::default(), connector).start();

    let users = Arc::new(users);
    let settings = Arc::new(settings);
    let log = Arc::new(InMemoryAccessLog::new());

    let controller = AccessController::start(
        AccessConfig::default(),
        connection,
        events,
        Collaborators {
            users: Arc::clone(&users),
            settings: Arc::clone(&settings),
            access_log: Arc::clone(&log),
        },
    );

    while controller.connection_state() != ConnectionState::Connected {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    Harness {
        controller,
        device,
        users,
        settings,
        log,
    }
}

impl<U, S> Harness<U, S> {
    pub async fn scan(&self, tag_id: &str) {
        assert!(
            self.device
                .send_event(&DeviceEvent::CardScanned { tag: tag(tag_id) })
                .await
        );
    }

    /// Let every task run until it blocks; time is paused.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
