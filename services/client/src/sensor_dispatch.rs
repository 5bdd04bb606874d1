//! Dispatcher entry points driven by the telephony host: `sensor_trigger`/
//! `sensor_restore` (§4.2, called on sensor-loop hook transitions) and
//! `keypad` (§4.10, called on a keypad collection request). These are the
//! producer side of the worker's queue: they lock, mutate, append, wake.

use std::time::Duration;

use alarm_core::AppendOutcome;
use alarm_host::interfaces::{Clock, HandlerDispatch, LogRecord, Logger, Telephony};
use alarm_protocol::EventKind;

use crate::shared::SharedClient;

const KEYPAD_MAX_ATTEMPTS: u32 = 4;
const KEYPAD_MAX_LEN: usize = 8;
const KEYPAD_TIMEOUT: Duration = Duration::from_secs(20);

/// Outcome the host uses to decide whether to also start a keypad
/// collection session on the premise line (the actual call/line wiring is
/// the host's concern; this only tells it whether one is warranted).
pub struct SensorTriggerOutcome {
    pub keypad_call_needed: bool,
}

pub async fn sensor_trigger<C, H, L>(
    shared: &SharedClient,
    clock: &C,
    dispatch: &H,
    logger: &L,
    sensor_id: Option<&str>,
    device: Option<&str>,
) -> Option<SensorTriggerOutcome>
where
    C: Clock,
    H: HandlerDispatch,
    L: Logger,
{
    let now = clock.now_secs().await;
    let mut state = shared.state.lock().await;
    let result = state.sensor_trigger(now, sensor_id, device)?;
    let outcome = state.append(
        EventKind::SensorTriggered,
        mmss_of(now),
        &result.sensor_id,
        &result.extra,
    );
    let seq = seq_of(outcome);
    let client_id = state.client_id.clone();
    drop(state);
    shared.wake();

    log_and_dispatch(
        dispatch,
        logger,
        &client_id,
        now,
        seq,
        EventKind::SensorTriggered,
        &result.sensor_id,
        &result.extra,
    )
    .await;

    Some(SensorTriggerOutcome {
        keypad_call_needed: result.keypad_call_needed,
    })
}

pub async fn sensor_restore<C, H, L>(
    shared: &SharedClient,
    clock: &C,
    dispatch: &H,
    logger: &L,
    sensor_id: &str,
) -> bool
where
    C: Clock,
    H: HandlerDispatch,
    L: Logger,
{
    let now = clock.now_secs().await;
    let mut state = shared.state.lock().await;
    let Some(resolved_id) = state.sensor_restore(sensor_id) else {
        return false;
    };
    let outcome = state.append(EventKind::SensorRestored, mmss_of(now), &resolved_id, "");
    let seq = seq_of(outcome);
    let client_id = state.client_id.clone();
    drop(state);
    shared.wake();

    log_and_dispatch(
        dispatch,
        logger,
        &client_id,
        now,
        seq,
        EventKind::SensorRestored,
        &resolved_id,
        "",
    )
    .await;
    true
}

/// Keypad collection session (§4.10). Called by the host once it has a
/// live line to the keypad device in hand.
pub async fn keypad<C, T, H, L>(
    shared: &SharedClient,
    clock: &C,
    telephony: &T,
    dispatch: &H,
    logger: &L,
    keypad_device: &str,
    prompt_audio: Option<&str>,
    configured_pins: &[String],
) where
    C: Clock,
    T: Telephony,
    H: HandlerDispatch,
    L: Logger,
{
    use alarm_core::ArmingState;

    let now = clock.now_secs().await;
    let armed = shared.state.lock().await.arming_state();

    if armed == ArmingState::Ok {
        let mut state = shared.state.lock().await;
        state.grant_egress(now);
        let outcome = state.append(EventKind::TempDisarmed, mmss_of(now), "", "");
        let seq = seq_of(outcome);
        let client_id = state.client_id.clone();
        drop(state);
        shared.wake();
        let _ = telephony.play_tone(keypad_device, true).await;
        log_and_dispatch(
            dispatch,
            logger,
            &client_id,
            now,
            seq,
            EventKind::TempDisarmed,
            "",
            "",
        )
        .await;
        return;
    }

    for _ in 0..KEYPAD_MAX_ATTEMPTS {
        let Ok(entered) = telephony
            .collect_dtmf(
                keypad_device,
                prompt_audio,
                KEYPAD_MAX_LEN,
                KEYPAD_TIMEOUT,
            )
            .await
        else {
            return;
        };
        if configured_pins.iter().any(|pin| pin == &entered) {
            let mut state = shared.state.lock().await;
            state.disarm();
            let outcome = state.append(EventKind::Disarmed, mmss_of(now), "", "");
            let seq = seq_of(outcome);
            let client_id = state.client_id.clone();
            drop(state);
            shared.wake();
            let _ = telephony.play_tone(keypad_device, true).await;
            log_and_dispatch(
                dispatch,
                logger,
                &client_id,
                now,
                seq,
                EventKind::Disarmed,
                "",
                "",
            )
            .await;
            return;
        }
        let _ = telephony.play_tone(keypad_device, false).await;
    }
    // All attempts exhausted: session ends with no state change, per §4.10.
}

async fn log_and_dispatch<H: HandlerDispatch, L: Logger>(
    dispatch: &H,
    logger: &L,
    client_id: &str,
    now: u64,
    seq: Option<u32>,
    event: EventKind,
    sensor_id: &str,
    extra: &str,
) {
    let record = LogRecord {
        timestamp_secs: now,
        client_id: client_id.to_owned(),
        seq,
        mmss: mmss_of(now),
        event,
        sensor_id: sensor_id.to_owned(),
        extra: extra.to_owned(),
    };
    let _ = logger.log_event(&record).await;
    dispatch
        .invoke(event.name(), client_id, event, sensor_id, extra)
        .await;
}

/// `AppendOutcome::Queued` carries the real queue sequence number; every
/// other variant is an inferred/direct event and logs as seq 0 (§6.3).
fn seq_of(outcome: AppendOutcome) -> Option<u32> {
    match outcome {
        AppendOutcome::Queued { seq } => Some(seq),
        _ => None,
    }
}

fn mmss_of(now: u64) -> Option<(u8, u8)> {
    let secs_in_hour = now % 3600;
    Some(((secs_in_hour / 60) as u8, (secs_in_hour % 60) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarm_core::{ArmingState, ClientRuntimeState, Sensor};
    use alarm_host::fakes::{FakeClock, FakeTelephony, RecordingDispatch, RecordingLogger};

    fn client() -> SharedClient {
        let mut c = ClientRuntimeState::new("A01", "1234", 30);
        c.add_sensor(Sensor::new("S1", 60));
        SharedClient::new(c)
    }

    #[tokio::test]
    async fn trigger_queues_event_and_flags_keypad_call() {
        let shared = client();
        let clock = FakeClock::new(1000);
        let dispatch = RecordingDispatch::new();
        let logger = RecordingLogger::new();

        let outcome = sensor_trigger(&shared, &clock, &dispatch, &logger, Some("S1"), None)
            .await
            .unwrap();
        assert!(outcome.keypad_call_needed);
        assert_eq!(shared.state.lock().await.queue.len(), 1);
        assert_eq!(dispatch.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn restore_clears_flag_and_queues_event() {
        let shared = client();
        let clock = FakeClock::new(1000);
        let dispatch = RecordingDispatch::new();
        let logger = RecordingLogger::new();

        sensor_trigger(&shared, &clock, &dispatch, &logger, Some("S1"), None).await;
        let ok = sensor_restore(&shared, &clock, &dispatch, &logger, "S1").await;
        assert!(ok);
        assert_eq!(shared.state.lock().await.queue.len(), 2);
    }

    #[tokio::test]
    async fn keypad_while_ok_grants_egress() {
        let shared = client();
        let clock = FakeClock::new(1000);
        let telephony = FakeTelephony::new(true);
        let dispatch = RecordingDispatch::new();
        let logger = RecordingLogger::new();

        keypad(
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
        assert_eq!(shared.state.lock().await.queue.len(), 1);
    }

    #[tokio::test]
    async fn keypad_while_triggered_disarms_on_matching_pin() {
        let shared = client();
        let clock = FakeClock::new(1000);
        shared
            .state
            .lock()
            .await
            .sensor_trigger(1000, Some("S1"), None);
        let telephony = FakeTelephony::new(true);
        telephony.push_inbound(b"1234".to_vec()).await;
        let dispatch = RecordingDispatch::new();
        let logger = RecordingLogger::new();

        keypad(
            &shared,
            &clock,
            &telephony,
            &dispatch,
            &logger,
            "kp0",
            None,
            &["1234".to_owned()],
        )
        .await;

        assert_eq!(shared.state.lock().await.arming_state(), ArmingState::Ok);
    }

    #[tokio::test]
    async fn keypad_exhausts_attempts_without_state_change() {
        let shared = client();
        let clock = FakeClock::new(1000);
        shared
            .state
            .lock()
            .await
            .sensor_trigger(1000, Some("S1"), None);
        let telephony = FakeTelephony::new(true);
        for _ in 0..KEYPAD_MAX_ATTEMPTS {
            telephony.push_inbound(b"0000".to_vec()).await;
        }
        let dispatch = RecordingDispatch::new();
        let logger = RecordingLogger::new();

        keypad(
            &shared,
            &clock,
            &telephony,
            &dispatch,
            &logger,
            "kp0",
            None,
            &["1234".to_owned()],
        )
        .await;

        assert_eq!(
            shared.state.lock().await.arming_state(),
            ArmingState::Triggered
        );
    }
}
