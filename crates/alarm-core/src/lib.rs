//! Pure, transport-free alarm logic: sensor resolution, the arming state
//! machine, the client-side send queue/sequencer, and the server-side
//! per-client reconciler. Every public entry point takes time as an
//! explicit `now: u64` (seconds) parameter rather than reading a clock, so
//! this crate stays deterministic and unit-testable on its own.

pub mod arming;
pub mod client_state;
pub mod queue;
pub mod reporter;
pub mod sensor;

pub use arming::{ArmingMachine, ArmingState};
pub use client_state::{AppendOutcome, ClientRuntimeState, LocalEvent, SensorTriggerResult};
pub use queue::{EventQueue, QueuedEvent};
pub use reporter::{DatagramOutcome, ReportingClient, SeqOutcome};
pub use sensor::Sensor;
