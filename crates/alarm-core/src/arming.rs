//! Arming state machine (spec §4.3). Time is second-resolution, matching
//! the original implementation's `time_t` semantics (spec §9 design notes).

/// `OK / TRIGGERED / BREACH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmingState {
    Ok,
    Triggered,
    Breach,
}

/// Arming state plus the timers that drive its transitions.
#[derive(Debug, Clone)]
pub struct ArmingMachine {
    pub state: ArmingState,
    /// Earliest deadline across all currently-triggered sensors.
    pub breach_deadline: Option<u64>,
    /// Time `TEMP_DISARMED` (egress grant) was last invoked.
    pub last_arm: u64,
}

impl ArmingMachine {
    pub fn new() -> ArmingMachine {
        ArmingMachine {
            state: ArmingState::Ok,
            breach_deadline: None,
            last_arm: 0,
        }
    }

    /// `now - last_arm < egress_delay`.
    pub fn is_egress(&self, now: u64, egress_delay: u64) -> bool {
        now.saturating_sub(self.last_arm) < egress_delay
    }

    /// A sensor with the given `disarm_delay` fired at `now`. Returns the
    /// absolute breach candidate deadline carried as the event's `extra`
    /// field, or `None` if this was an egress event or the sensor never
    /// arms (`disarm_delay == 0`).
    pub fn on_sensor_triggered(
        &mut self,
        now: u64,
        disarm_delay: u32,
        egress_delay: u64,
    ) -> Option<u64> {
        if self.is_egress(now, egress_delay) || disarm_delay == 0 {
            return None;
        }
        let candidate = now + u64::from(disarm_delay);
        self.state = ArmingState::Triggered;
        self.breach_deadline = match self.breach_deadline {
            Some(existing) if existing <= candidate => Some(existing),
            _ => Some(candidate),
        };
        Some(candidate)
    }

    /// Operator entered a valid PIN: TRIGGERED/BREACH -> OK.
    pub fn disarm(&mut self) {
        self.state = ArmingState::Ok;
        self.breach_deadline = None;
    }

    /// Egress grant: does not change arming state, only `last_arm`.
    pub fn grant_egress(&mut self, now: u64) {
        self.last_arm = now;
    }

    /// Worker/housekeeping tick: TRIGGERED -> BREACH once the deadline has passed.
    /// Returns `true` if a transition (and thus an inferred `BREACH` emission) occurred.
    pub fn check_breach(&mut self, now: u64) -> bool {
        if self.state == ArmingState::Triggered {
            if let Some(deadline) = self.breach_deadline {
                if now >= deadline {
                    self.state = ArmingState::Breach;
                    return true;
                }
            }
        }
        false
    }

    /// Reconciler-side equivalent of `on_sensor_triggered`: apply an
    /// incoming absolute deadline (spec §4.8 event-specific handling),
    /// taking the earlier of existing and incoming.
    pub fn apply_incoming_breach_candidate(&mut self, candidate: u64) {
        self.state = ArmingState::Triggered;
        self.breach_deadline = match self.breach_deadline {
            Some(existing) if existing <= candidate => Some(existing),
            _ => Some(candidate),
        };
    }
}

impl Default for ArmingMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn egress_window_suppresses_trigger() {
        let mut m = ArmingMachine::new();
        m.grant_egress(0);
        let candidate = m.on_sensor_triggered(10, 60, 30);
        assert_eq!(candidate, None);
        assert_eq!(m.state, ArmingState::Ok);
    }

    #[test]
    fn zero_disarm_delay_never_arms() {
        let mut m = ArmingMachine::new();
        let candidate = m.on_sensor_triggered(0, 0, 30);
        assert_eq!(candidate, None);
        assert_eq!(m.state, ArmingState::Ok);
    }

    #[test]
    fn trigger_outside_egress_sets_deadline() {
        let mut m = ArmingMachine::new();
        let candidate = m.on_sensor_triggered(100, 60, 30);
        assert_eq!(candidate, Some(160));
        assert_eq!(m.state, ArmingState::Triggered);
        assert_eq!(m.breach_deadline, Some(160));
    }

    #[test]
    fn breach_deadline_takes_earliest_of_multiple_sensors() {
        let mut m = ArmingMachine::new();
        m.on_sensor_triggered(0, 20, 30); // deadline 20
        m.on_sensor_triggered(0, 10, 30); // deadline 10, earlier
        assert_eq!(m.breach_deadline, Some(10));
        m.on_sensor_triggered(0, 5, 30); // later-arriving but earlier deadline still wins
        assert_eq!(m.breach_deadline, Some(5));
    }

    #[test]
    fn breach_timeout_transitions_once() {
        let mut m = ArmingMachine::new();
        m.on_sensor_triggered(0, 60, 30);
        assert!(!m.check_breach(59));
        assert!(m.check_breach(60));
        assert_eq!(m.state, ArmingState::Breach);
    }

    #[test]
    fn disarm_clears_deadline_from_any_state() {
        let mut m = ArmingMachine::new();
        m.on_sensor_triggered(0, 60, 30);
        m.check_breach(60);
        m.disarm();
        assert_eq!(m.state, ArmingState::Ok);
        assert_eq!(m.breach_deadline, None);
    }
}
