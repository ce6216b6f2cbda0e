//! End-to-end scenarios: mock controller → connection manager → access
//! controller → commands, broadcasts and the access log.

mod common;

use common::{
    ACTIVE_TAG, INACTIVE_TAG, PORT, UNKNOWN_TAG, harness, harness_with, harness_with_stores,
    seeded_directory, tag,
};
use gatekeep_access::{
    AccessError, AccessReason, BroadcastEvent, CommandDelivery, GateAction, GateControl,
    GateLocked, GateState, SettingsStore, Topic, TransitionSource, UserDirectory,
};
use gatekeep_core::{AccessDirection, DeviceRef, DeviceStatus, TagId, UserRecord};
use gatekeep_hardware::ConnectionState;
use gatekeep_protocol::DeviceEvent;
use std::time::Duration;

fn control(state: GateState, delivery: CommandDelivery) -> GateControl {
    GateControl { state, delivery }
}

fn decision_of(event: &BroadcastEvent) -> (&gatekeep_access::AccessDecision, &DeviceRef) {
    match event {
        BroadcastEvent::Decision { decision, device } => (decision, device),
        other => panic!("expected a decision, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_active_tag_is_granted() {
    let mut h = harness().await;
    let mut decisions = h.controller.subscribe([Topic::Decisions]);

    h.scan(ACTIVE_TAG).await;

    assert_eq!(
        h.device.next_written().await.as_deref(),
        Some("ACCESS_GRANTED:D0D39925:5")
    );

    let event = decisions.recv().await.unwrap();
    let (decision, device) = decision_of(&event);
    assert!(decision.granted);
    assert_eq!(decision.reason, AccessReason::Granted);
    assert_eq!(decision.user.as_ref().unwrap().name, "Ana Souza");
    assert_eq!(device.id, PORT);
    assert_eq!(h.controller.gate_state(), GateState::Open);

    h.log.wait_for_len(1).await;
    assert_eq!(h.log.entries().await[0].decision.id, decision.id);
}

#[tokio::test(start_paused = true)]
async fn test_auto_lock_delay_setting_is_sent() {
    let mut h = harness().await;
    h.settings.set("autoLockDelay", "8").await;

    h.scan(ACTIVE_TAG).await;

    assert_eq!(
        h.device.next_written().await.as_deref(),
        Some("ACCESS_GRANTED:D0D39925:8")
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_auto_lock_setting_falls_back() {
    let mut h = harness().await;
    h.settings.set("autoLockDelay", "soon").await;

    h.scan(ACTIVE_TAG).await;

    assert_eq!(
        h.device.next_written().await.as_deref(),
        Some("ACCESS_GRANTED:D0D39925:5")
    );
}

#[tokio::test(start_paused = true)]
async fn test_unknown_tag_is_denied() {
    let mut h = harness().await;
    let mut decisions = h.controller.subscribe([Topic::Decisions]);

    h.scan(UNKNOWN_TAG).await;

    assert_eq!(
        h.device.next_written().await.as_deref(),
        Some("ACCESS_DENIED:00000000")
    );
    let event = decisions.recv().await.unwrap();
    let (decision, _) = decision_of(&event);
    assert_eq!(decision.reason, AccessReason::UnknownTag);
    assert!(decision.user.is_none());
    assert_eq!(h.controller.gate_state(), GateState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_inactive_account_is_denied() {
    let mut h = harness().await;
    let mut decisions = h.controller.subscribe([Topic::Decisions]);

    h.scan(INACTIVE_TAG).await;

    assert_eq!(
        h.device.next_written().await.as_deref(),
        Some("ACCESS_DENIED:CAFEBABE")
    );
    let event = decisions.recv().await.unwrap();
    assert_eq!(decision_of(&event).0.reason, AccessReason::InactiveAccount);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_scans_are_debounced() {
    let mut h = harness().await;

    h.scan(UNKNOWN_TAG).await;
    assert_eq!(
        h.device.next_written().await.as_deref(),
        Some("ACCESS_DENIED:00000000")
    );

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    h.scan(UNKNOWN_TAG).await;
    h.settle().await;
    assert_eq!(h.device.written().len(), 1);

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    h.scan(UNKNOWN_TAG).await;
    assert_eq!(
        h.device.next_written().await.as_deref(),
        Some("ACCESS_DENIED:00000000")
    );

    h.log.wait_for_len(2).await;
    assert_eq!(h.log.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_locked_gate_makes_device_unavailable() {
    let mut h = harness().await;
    let mut decisions = h.controller.subscribe([Topic::Decisions]);

    assert_eq!(
        h.controller.control_gate(GateAction::Lock).await,
        Ok(control(GateState::Locked, CommandDelivery::NotRequired))
    );

    h.scan(ACTIVE_TAG).await;
    assert_eq!(
        h.device.next_written().await.as_deref(),
        Some("ACCESS_DENIED:D0D39925")
    );
    let event = decisions.recv().await.unwrap();
    assert_eq!(decision_of(&event).0.reason, AccessReason::DeviceUnavailable);

    assert_eq!(h.controller.control_gate(GateAction::Open).await, Err(GateLocked));
    assert_eq!(h.controller.gate_state(), GateState::Locked);

    assert_eq!(
        h.controller.control_gate(GateAction::Unlock).await,
        Ok(control(GateState::Closed, CommandDelivery::NotRequired))
    );
}

#[tokio::test(start_paused = true)]
async fn test_operator_open_relocks_and_closes_controller() {
    let mut h = harness().await;

    assert_eq!(
        h.controller.control_gate(GateAction::Open).await,
        Ok(control(GateState::Open, CommandDelivery::Sent))
    );
    assert_eq!(h.device.next_written().await.as_deref(), Some("OPEN_GATE"));

    // Relock after the default five seconds
    assert_eq!(h.device.next_written().await.as_deref(), Some("CLOSE_GATE"));
    assert_eq!(h.controller.gate_state(), GateState::Closed);

    let history = h.controller.gate().history().await;
    assert_eq!(history.last().unwrap().source, TransitionSource::Relock);
}

#[tokio::test(start_paused = true)]
async fn test_noop_gate_actions_send_nothing() {
    let h = harness().await;

    let noop = Ok(control(GateState::Closed, CommandDelivery::NotRequired));
    assert_eq!(h.controller.control_gate(GateAction::Close).await, noop);
    assert_eq!(h.controller.control_gate(GateAction::Unlock).await, noop);
    h.settle().await;
    assert!(h.device.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_controller_gate_reports_reconcile_state() {
    let h = harness().await;
    let mut gate_events = h.controller.subscribe([Topic::GateState]);

    h.device.send_event(&DeviceEvent::GateOpened).await;
    gate_events.recv().await.unwrap();
    assert_eq!(h.controller.gate_state(), GateState::Open);

    h.device.send_event(&DeviceEvent::GateClosed).await;
    gate_events.recv().await.unwrap();
    assert_eq!(h.controller.gate_state(), GateState::Closed);

    h.controller.control_gate(GateAction::Lock).await.unwrap();
    h.device.send_event(&DeviceEvent::GateOpened).await;
    h.settle().await;
    assert_eq!(h.controller.gate_state(), GateState::Locked);
}

#[tokio::test(start_paused = true)]
async fn test_diagnostic_lines_are_broadcast() {
    let h = harness().await;
    let mut logs = h.controller.subscribe([Topic::DeviceLog]);

    h.device.send_line("RFID reader initialised").await;

    let event = logs.recv().await.unwrap();
    match event.as_ref() {
        BroadcastEvent::DeviceLog { line, .. } => assert_eq!(line, "RFID reader initialised"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_connection_changes_are_broadcast() {
    let h = harness().await;
    let mut connection = h.controller.subscribe([Topic::ConnectionState]);

    h.device.fail_link("device reports an error");

    loop {
        let event = connection.recv().await.unwrap();
        match event.as_ref() {
            BroadcastEvent::Connection { state, .. } if *state == ConnectionState::Disconnected => {
                break;
            }
            BroadcastEvent::Connection { .. } => continue,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(h.controller.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_http_scan_uses_device_status() {
    let h = harness().await;
    let online =
        DeviceRef::new("turnstile-2", DeviceStatus::Online).with_direction(AccessDirection::Exit);
    let offline = DeviceRef::new("turnstile-3", DeviceStatus::Maintenance);

    let decision = h.controller.submit_scan(tag(ACTIVE_TAG), online).await;
    assert!(decision.granted);
    assert_eq!(decision.direction, AccessDirection::Exit);

    // Not debounced
    let decision = h.controller.submit_scan(tag(ACTIVE_TAG), offline).await;
    assert_eq!(decision.reason, AccessReason::DeviceUnavailable);

    h.log.wait_for_len(2).await;
    let entries = h.log.entries().await;
    assert_eq!(entries[1].device.id, "turnstile-3");

    // The HTTP path never commands the serial controller
    h.settle().await;
    assert!(h.device.written().is_empty());
    assert_eq!(h.controller.gate_state(), GateState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_persistence_failure_does_not_block_command() {
    let mut h = harness().await;
    h.log.set_failure(Some("database unavailable")).await;

    h.scan(UNKNOWN_TAG).await;
    assert_eq!(
        h.device.next_written().await.as_deref(),
        Some("ACCESS_DENIED:00000000")
    );
    h.settle().await;
    assert!(h.log.is_empty());
}

struct SlowDirectory;

impl UserDirectory for SlowDirectory {
    async fn find_user_by_tag(&self, _tag: &TagId) -> gatekeep_access::Result<Option<UserRecord>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Some(UserRecord::new("9", "Too Late")))
    }
}

struct BrokenDirectory;

impl UserDirectory for BrokenDirectory {
    async fn find_user_by_tag(&self, _tag: &TagId) -> gatekeep_access::Result<Option<UserRecord>> {
        Err(AccessError::lookup_failed("connection refused"))
    }
}

#[tokio::test(start_paused = true)]
async fn test_lookup_timeout_is_unknown_tag() {
    let mut h = harness_with(SlowDirectory).await;
    let started = tokio::time::Instant::now();

    h.scan(ACTIVE_TAG).await;

    assert_eq!(
        h.device.next_written().await.as_deref(),
        Some("ACCESS_DENIED:D0D39925")
    );
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_lookup_failure_is_unknown_tag() {
    let h = harness_with(BrokenDirectory).await;
    let decision = h
        .controller
        .submit_scan(tag(ACTIVE_TAG), DeviceRef::new("reader", DeviceStatus::Online))
        .await;
    assert_eq!(decision.reason, AccessReason::UnknownTag);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_disconnects() {
    let h = harness().await;
    h.controller.shutdown().await;
    assert_eq!(h.controller.connection_state(), ConnectionState::Disconnected);
    assert!(!h.device.is_link_open());
}

#[tokio::test(start_paused = true)]
async fn test_operator_actions_report_unreachable_controller() {
    let h = harness().await;

    h.device.unplug();
    while h.controller.connection_state() != ConnectionState::Disconnected {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let outcome = h.controller.control_gate(GateAction::Open).await.unwrap();
    assert_eq!(outcome, control(GateState::Closed, CommandDelivery::Unreachable));
    assert!(!outcome.is_delivered());
    assert_eq!(h.controller.gate_state(), GateState::Closed);

    // Lockdown is backend policy and needs no controller
    let outcome = h.controller.control_gate(GateAction::Lock).await.unwrap();
    assert_eq!(outcome, control(GateState::Locked, CommandDelivery::NotRequired));
    assert_eq!(h.controller.control_gate(GateAction::Open).await, Err(GateLocked));

    h.settle().await;
    assert!(h.device.written().is_empty());
}

/// Settings store that answers after a delay.
struct SlowSettings {
    delay: Duration,
    auto_lock_seconds: &'static str,
}

impl SettingsStore for SlowSettings {
    async fn get_setting(&self, _key: &str) -> gatekeep_access::Result<Option<String>> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(self.auto_lock_seconds.to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_lock_during_grant_wins_over_grant() {
    let settings = SlowSettings {
        delay: Duration::from_secs(1),
        auto_lock_seconds: "8",
    };
    let mut h = harness_with_stores(seeded_directory(), settings).await;
    let mut decisions = h.controller.subscribe([Topic::Decisions]);

    h.scan(ACTIVE_TAG).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    h.controller.control_gate(GateAction::Lock).await.unwrap();

    assert_eq!(
        h.device.next_written().await.as_deref(),
        Some("ACCESS_DENIED:D0D39925")
    );
    let event = decisions.recv().await.unwrap();
    let (decision, _) = decision_of(&event);
    assert!(!decision.granted);
    assert_eq!(decision.reason, AccessReason::DeviceUnavailable);
    assert_eq!(h.controller.gate_state(), GateState::Locked);

    h.settle().await;
    assert_eq!(h.device.written(), vec!["ACCESS_DENIED:D0D39925"]);
}
