//! The abstract host interfaces sensor/arming logic is built against
//! (`Telephony`, `Clock`, `HandlerDispatch`, `Logger`). `alarm-core` never
//! depends on these directly; only `services/client` and `services/server`
//! are generic over them, so unit tests can run the pure state machines
//! without any of this.
//!
//! These use native `async fn` in trait rather than the `async-trait` crate:
//! every caller takes a concrete or generic `impl Trait`, never `dyn Trait`,
//! so the usual dyn-compatibility objection doesn't apply here.

use std::time::Duration;

use alarm_protocol::EventKind;

/// Seconds since an unspecified but consistent epoch. Matches the `time_t`
/// resolution the rest of the core logic is built around.
pub trait Clock {
    async fn now_secs(&self) -> u64;
}

/// Originate calls, exchange DTMF, and park/release lines. One `Call`
/// handle per active call; dropping it without parking hangs up.
pub trait Telephony {
    type Call: Send;

    /// Dial `dialstr` and wait up to `answer_timeout` for pickup. Busy,
    /// congestion, and no-answer are all terminal `TelephonyError`s.
    async fn originate_call(
        &self,
        dialstr: &str,
        answer_timeout: Duration,
    ) -> Result<Self::Call, TelephonyError>;

    /// Send a DTMF-encoded chunk, terminator included.
    async fn send_dtmf(&self, call: &mut Self::Call, payload: &[u8]) -> Result<(), TelephonyError>;

    /// Read one `#`-terminated DTMF chunk, bounded by `timeout`.
    async fn read_dtmf(
        &self,
        call: &mut Self::Call,
        timeout: Duration,
    ) -> Result<Vec<u8>, TelephonyError>;

    /// Park the line into audio-autoservice and release the handle. The
    /// host tears the line down on its own once it has sat parked for
    /// longer than `idle_hold` — the caller has no further handle to act on.
    async fn park_autoservice(
        &self,
        call: Self::Call,
        idle_hold: Duration,
    ) -> Result<(), TelephonyError>;

    /// Hang up without parking (used on terminal failure).
    async fn hang_up(&self, call: Self::Call) -> Result<(), TelephonyError>;

    /// Keypad collection: play `prompt_audio` (or a fallback alert tone if
    /// `None`) on `device`, then read up to `max_len` DTMF digits bounded by
    /// `timeout`.
    async fn collect_dtmf(
        &self,
        device: &str,
        prompt_audio: Option<&str>,
        max_len: usize,
        timeout: Duration,
    ) -> Result<String, TelephonyError>;

    /// Play a short confirmation/rejection tone on `device`.
    async fn play_tone(&self, device: &str, confirm: bool) -> Result<(), TelephonyError>;
}

#[derive(Debug)]
pub enum TelephonyError {
    Busy,
    NoAnswer,
    Congestion,
    Timeout,
    HookLost,
    Io(String),
}

impl std::fmt::Display for TelephonyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelephonyError::Busy => write!(f, "line busy"),
            TelephonyError::NoAnswer => write!(f, "no answer"),
            TelephonyError::Congestion => write!(f, "network congestion"),
            TelephonyError::Timeout => write!(f, "timed out"),
            TelephonyError::HookLost => write!(f, "hook state lost mid-call"),
            TelephonyError::Io(s) => write!(f, "telephony I/O error: {s}"),
        }
    }
}

impl std::error::Error for TelephonyError {}

/// Fire-and-forget named-handler invocation (dialplan-style event hooks).
/// Never fails observably to the caller; failures are the dispatcher's own
/// concern to log.
pub trait HandlerDispatch {
    async fn invoke(
        &self,
        handler_name: &str,
        client_id: &str,
        event: EventKind,
        sensor_id: &str,
        extra: &str,
    );
}

/// One row of the durable per-installation event record (§6.3). The CSV
/// logger opens the file, appends exactly one row, and closes it again —
/// no long-lived file handle.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp_secs: u64,
    pub client_id: String,
    pub seq: Option<u32>,
    pub mmss: Option<(u8, u8)>,
    pub event: EventKind,
    pub sensor_id: String,
    pub extra: String,
}

pub trait Logger {
    async fn log_event(&self, record: &LogRecord) -> Result<(), LoggerError>;
}

#[derive(Debug)]
pub enum LoggerError {
    Io(String),
}

impl std::fmt::Display for LoggerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggerError::Io(s) => write!(f, "log I/O error: {s}"),
        }
    }
}

impl std::error::Error for LoggerError {}
