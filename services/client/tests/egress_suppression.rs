//! End-to-end scenario: a keypad entry while OK grants a timed egress
//! window, and a sensor trip inside that window is logged but does not
//! arm the panel or request a keypad call back (spec §8 scenario 3).

use alarm_core::{ArmingState, ClientRuntimeState, Sensor};
use alarm_host::fakes::{FakeClock, FakeTelephony, RecordingDispatch, RecordingLogger};
use alarm_protocol::EventKind;
use client::{sensor_dispatch, SharedClient};

fn shared() -> SharedClient {
    let mut state = ClientRuntimeState::new("A01", "1234", 30);
    state.add_sensor(Sensor::new("FRONT_DOOR", 60));
    SharedClient::new(state)
}

#[tokio::test]
async fn trip_during_egress_window_is_logged_but_does_not_arm() {
    let shared = shared();
    let clock = FakeClock::new(1000);
    let telephony = FakeTelephony::new(true);
    let dispatch = RecordingDispatch::new();
    let logger = RecordingLogger::new();

    // Keypad used while OK: grants egress, does not ask for a PIN.
    sensor_dispatch::keypad(
        &shared,
        &clock,
        &telephony,
        &dispatch,
        &logger,
        "kp0",
        None,
        &[],
    )
    .await;
    assert_eq!(shared.state.lock().await.arming_state(), ArmingState::Ok);

    // Sensor trips a few seconds later, still inside the 30s egress window.
    clock.advance(10);
    let outcome = sensor_dispatch::sensor_trigger(
        &shared,
        &clock,
        &dispatch,
        &logger,
        Some("FRONT_DOOR"),
        None,
    )
    .await
    .unwrap();

    assert!(!outcome.keypad_call_needed);
    assert_eq!(shared.state.lock().await.arming_state(), ArmingState::Ok);

    // Both the egress grant and the suppressed trip were logged/dispatched.
    let rows = logger.rows.lock().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].event, EventKind::TempDisarmed);
    assert_eq!(rows[1].event, EventKind::SensorTriggered);
    assert_eq!(rows[1].extra, "");
}

#[tokio::test]
async fn trip_after_egress_window_arms_and_requests_keypad_call() {
    let shared = shared();
    let clock = FakeClock::new(1000);
    let telephony = FakeTelephony::new(true);
    let dispatch = RecordingDispatch::new();
    let logger = RecordingLogger::new();

    sensor_dispatch::keypad(
        &shared,
        &clock,
        &telephony,
        &dispatch,
        &logger,
        "kp0",
        None,
        &[],
    )
    .await;

    // Well past the 30s egress window.
    clock.advance(45);
    let outcome = sensor_dispatch::sensor_trigger(
        &shared,
        &clock,
        &dispatch,
        &logger,
        Some("FRONT_DOOR"),
        None,
    )
    .await
    .unwrap();

    assert!(outcome.keypad_call_needed);
    assert_eq!(
        shared.state.lock().await.arming_state(),
        ArmingState::Triggered
    );
}
