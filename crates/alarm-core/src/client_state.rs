//! Client runtime state (spec §3 "Client runtime state"), composed from the
//! arming state machine and the event queue/sequencer. Transport bookkeeping
//! (`ip_connected`, `phone_channel`, ...) lives with the transports in
//! `services/client`, not here — this struct owns only what the sensor and
//! arming logic need.

use alarm_protocol::{self as proto, EventKind};

use crate::arming::{ArmingMachine, ArmingState};
use crate::sensor::{self, Sensor};

/// A locally-logged/handled event that is not placed on the wire queue
/// (either inferred, or because it carries no sequence number, like PING).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEvent {
    pub event: EventKind,
    pub sensor_id: String,
    pub extra: String,
}

/// Outcome of feeding an event through `ClientRuntimeState::append`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Queued for transmission with the given sequence number.
    Queued { seq: u32 },
    /// Not queued (PING); caller sends it directly, best-effort.
    SendDirect { local: LocalEvent },
    /// Not queued (inferred); caller only logs/dispatches handlers.
    Inferred { local: LocalEvent },
}

#[derive(Debug)]
pub struct ClientRuntimeState {
    pub client_id: String,
    pub pin: String,
    pub egress_delay: u64,
    pub arming: ArmingMachine,
    pub queue: crate::queue::EventQueue,
    sensors: Vec<Sensor>,
}

impl ClientRuntimeState {
    pub fn new(client_id: impl Into<String>, pin: impl Into<String>, egress_delay: u64) -> Self {
        ClientRuntimeState {
            client_id: client_id.into(),
            pin: pin.into(),
            egress_delay,
            arming: ArmingMachine::new(),
            queue: crate::queue::EventQueue::new(),
            sensors: Vec::new(),
        }
    }

    pub fn add_sensor(&mut self, sensor: Sensor) {
        self.sensors.push(sensor);
    }

    pub fn arming_state(&self) -> ArmingState {
        self.arming.state
    }

    /// Append an event per spec §4.4. `mmss` is the minute/second of local
    /// wall time at generation; `sensor_id`/`extra` are event payload fields.
    pub fn append(
        &mut self,
        event: EventKind,
        mmss: Option<(u8, u8)>,
        sensor_id: &str,
        extra: &str,
    ) -> AppendOutcome {
        if event == EventKind::Ping {
            return AppendOutcome::SendDirect {
                local: LocalEvent {
                    event,
                    sensor_id: sensor_id.to_owned(),
                    extra: extra.to_owned(),
                },
            };
        }
        if event.is_inferred() {
            return AppendOutcome::Inferred {
                local: LocalEvent {
                    event,
                    sensor_id: sensor_id.to_owned(),
                    extra: extra.to_owned(),
                },
            };
        }
        let frame = proto::encode(
            &self.client_id,
            &self.pin,
            Some(self.queue.next_seq()),
            mmss,
            event,
            sensor_id,
            extra,
        );
        let seq = self.queue.append(frame);
        AppendOutcome::Queued { seq }
    }

    /// Sensor off-hook transition (spec §4.2). Resolves by name then device,
    /// updates arming state/breach timer, and returns the `SENSOR_TRIGGERED`
    /// event to enqueue (its `extra` is the absolute deadline, or empty).
    pub fn sensor_trigger(
        &mut self,
        now: u64,
        sensor_id: Option<&str>,
        device: Option<&str>,
    ) -> Option<SensorTriggerResult> {
        let (disarm_delay, resolved_id) = {
            let sensor = sensor::resolve(&mut self.sensors, sensor_id, device)?;
            sensor.triggered = true;
            (sensor.disarm_delay, sensor.id.clone())
        };
        let is_egress = self.arming.is_egress(now, self.egress_delay);
        let candidate = self.arming.on_sensor_triggered(now, disarm_delay, self.egress_delay);
        let keypad_call_needed = candidate.is_some() && !is_egress;
        Some(SensorTriggerResult {
            sensor_id: resolved_id,
            extra: candidate.map(|c| c.to_string()).unwrap_or_default(),
            keypad_call_needed,
        })
    }

    /// Sensor on-hook transition: clears `triggered`, returns the sensor id
    /// for the `SENSOR_RESTORED` event.
    pub fn sensor_restore(&mut self, sensor_id: &str) -> Option<String> {
        let sensor = self.sensors.iter_mut().find(|s| s.id == sensor_id)?;
        sensor.triggered = false;
        Some(sensor.id.clone())
    }

    /// Valid PIN entered via keypad while TRIGGERED/BREACH.
    pub fn disarm(&mut self) {
        self.arming.disarm();
    }

    /// Keypad invoked while OK: egress grant.
    pub fn grant_egress(&mut self, now: u64) {
        self.arming.grant_egress(now);
    }

    /// Worker tick: advance TRIGGERED -> BREACH if the deadline has passed.
    pub fn check_breach(&mut self, now: u64) -> bool {
        self.arming.check_breach(now)
    }
}

pub struct SensorTriggerResult {
    pub sensor_id: String,
    pub extra: String,
    pub keypad_call_needed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::Sensor;

    fn client() -> ClientRuntimeState {
        let mut c = ClientRuntimeState::new("A01", "1234", 30);
        c.add_sensor(Sensor::new("S1", 60));
        c
    }

    #[test]
    fn trigger_outside_egress_queues_and_arms() {
        let mut c = client();
        let result = c.sensor_trigger(0, Some("S1"), None).unwrap();
        assert_eq!(result.extra, "60");
        assert!(result.keypad_call_needed);
        assert_eq!(c.arming_state(), ArmingState::Triggered);
    }

    #[test]
    fn trigger_during_egress_does_not_arm() {
        let mut c = client();
        c.grant_egress(0);
        let result = c.sensor_trigger(10, Some("S1"), None).unwrap();
        assert_eq!(result.extra, "");
        assert!(!result.keypad_call_needed);
        assert_eq!(c.arming_state(), ArmingState::Ok);
    }

    #[test]
    fn ping_and_inferred_events_never_consume_a_sequence_number() {
        let mut c = client();
        let before = c.queue.next_seq();
        let outcome = c.append(EventKind::Ping, None, "", "");
        assert!(matches!(outcome, AppendOutcome::SendDirect { .. }));
        assert_eq!(c.queue.next_seq(), before);

        let outcome = c.append(EventKind::Breach, None, "", "");
        assert!(matches!(outcome, AppendOutcome::Inferred { .. }));
        assert_eq!(c.queue.next_seq(), before);
    }

    #[test]
    fn okay_and_sensor_events_consume_ascending_sequence_numbers() {
        let mut c = client();
        let o1 = c.append(EventKind::Okay, Some((0, 0)), "", "");
        let o2 = c.append(EventKind::SensorTriggered, Some((0, 1)), "S1", "60");
        match (o1, o2) {
            (AppendOutcome::Queued { seq: 1 }, AppendOutcome::Queued { seq: 2 }) => {}
            other => panic!("unexpected outcomes: {other:?}"),
        }
    }

    #[test]
    fn disarm_clears_breach_deadline_until_next_trigger() {
        let mut c = client();
        c.sensor_trigger(0, Some("S1"), None);
        c.disarm();
        assert_eq!(c.arming.breach_deadline, None);
        assert_eq!(c.arming_state(), ArmingState::Ok);
    }
}
