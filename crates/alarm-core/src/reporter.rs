//! Server-side per-reporting-client reconciled state (spec §3
//! "ReportingClient", §4.8 dispatcher & reconciler).

use alarm_protocol::{EventKind, Message};

use crate::arming::{ArmingMachine, ArmingState};

#[derive(Debug)]
pub struct ReportingClient {
    pub client_id: String,
    pub pin: Option<String>,
    pub next_expected_seq: u32,
    pub received_any: bool,
    pub last_ip_contact: u64,
    pub ip_connected: bool,
    pub arming: ArmingMachine,
}

impl ReportingClient {
    pub fn new(client_id: impl Into<String>, pin: Option<String>) -> ReportingClient {
        ReportingClient {
            client_id: client_id.into(),
            pin,
            next_expected_seq: 1,
            received_any: false,
            last_ip_contact: 0,
            ip_connected: false,
            arming: ArmingMachine::new(),
        }
    }

    pub fn arming_state(&self) -> ArmingState {
        self.arming.state
    }

    /// Check the PIN (if the reporter has one configured) per spec §4.8 step 2.
    pub fn pin_matches(&self, incoming_pin: &str) -> bool {
        match &self.pin {
            Some(p) => p == incoming_pin,
            None => true,
        }
    }

    /// Apply one authenticated, decoded datagram. Returns the server's
    /// reaction: whether connectivity was just restored (caller emits
    /// inferred `INTERNET_RESTORED`) and what ack (if any) to send.
    pub fn on_datagram(&mut self, msg: &Message, now: u64) -> DatagramOutcome {
        let became_connected = !self.ip_connected;
        self.ip_connected = true;
        self.last_ip_contact = now;

        if msg.event == EventKind::Ping {
            return DatagramOutcome {
                became_connected,
                seq_outcome: SeqOutcome::Ping,
                ack: Some(self.next_expected_seq),
            };
        }

        let seq = match msg.seq {
            Some(s) => s,
            None => {
                // Non-ping events always carry a seq; treat a missing one as a gap.
                return DatagramOutcome {
                    became_connected,
                    seq_outcome: SeqOutcome::Gap,
                    ack: None,
                };
            }
        };

        let seq_outcome = self.decide_seq(seq);
        if matches!(seq_outcome, SeqOutcome::Accepted) {
            self.apply_event_specific(msg);
            self.next_expected_seq += 1;
        }
        let ack = match seq_outcome {
            SeqOutcome::Gap => None,
            _ => Some(self.next_expected_seq),
        };
        DatagramOutcome {
            became_connected,
            seq_outcome,
            ack,
        }
    }

    /// §4.8 step 6, the five-way sequence rule.
    fn decide_seq(&mut self, seq: u32) -> SeqOutcome {
        if seq == self.next_expected_seq {
            self.received_any = true;
            SeqOutcome::Accepted
        } else if !self.received_any {
            self.next_expected_seq = seq;
            self.received_any = true;
            SeqOutcome::Accepted
        } else if seq == 1 && self.next_expected_seq > 1 {
            self.next_expected_seq = 1;
            SeqOutcome::Accepted
        } else if seq < self.next_expected_seq {
            SeqOutcome::Duplicate
        } else {
            SeqOutcome::Gap
        }
    }

    fn apply_event_specific(&mut self, msg: &Message) {
        match msg.event {
            EventKind::SensorTriggered => {
                if let Ok(candidate) = msg.extra.parse::<u64>() {
                    if candidate != 0 {
                        self.arming.apply_incoming_breach_candidate(candidate);
                    }
                }
                // Empty/zero extra was an egress event; no alarm.
            }
            EventKind::Disarmed => self.arming.disarm(),
            _ => {}
        }
    }

    /// 1 Hz housekeeping: flip to offline if silent past `ip_loss_tolerance`.
    /// Returns `true` if a transition (and thus inferred `INTERNET_LOST`) occurred.
    pub fn check_ip_loss(&mut self, now: u64, ip_loss_tolerance: u64) -> bool {
        if self.ip_connected && self.last_ip_contact + ip_loss_tolerance < now {
            self.ip_connected = false;
            true
        } else {
            false
        }
    }

    /// 1 Hz housekeeping: TRIGGERED -> BREACH once the deadline passes.
    pub fn check_breach(&mut self, now: u64) -> bool {
        self.arming.check_breach(now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqOutcome {
    Accepted,
    Duplicate,
    Gap,
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramOutcome {
    pub became_connected: bool,
    pub seq_outcome: SeqOutcome,
    pub ack: Option<u32>,
}
