//! In-memory test doubles for the host interfaces, shared by `alarm-core`
//! consumers' and the service binaries' test suites — the host-trait
//! analogue of the teacher's `rt-test-utils` mock WS client/server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use alarm_protocol::EventKind;

use crate::interfaces::{Clock, HandlerDispatch, Logger, LogRecord, LoggerError, Telephony, TelephonyError};

/// A clock whose value is set directly by the test, never by wall time.
#[derive(Debug, Default)]
pub struct FakeClock {
    secs: AtomicU64,
}

impl FakeClock {
    pub fn new(start_secs: u64) -> FakeClock {
        FakeClock {
            secs: AtomicU64::new(start_secs),
        }
    }

    pub fn advance(&self, delta_secs: u64) {
        self.secs.fetch_add(delta_secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    async fn now_secs(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}

/// Records every invocation; never actually calls out anywhere.
#[derive(Debug, Default)]
pub struct RecordingDispatch {
    pub calls: Mutex<Vec<DispatchCall>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchCall {
    pub handler_name: String,
    pub client_id: String,
    pub event: EventKind,
    pub sensor_id: String,
    pub extra: String,
}

impl RecordingDispatch {
    pub fn new() -> RecordingDispatch {
        RecordingDispatch::default()
    }
}

impl HandlerDispatch for RecordingDispatch {
    async fn invoke(
        &self,
        handler_name: &str,
        client_id: &str,
        event: EventKind,
        sensor_id: &str,
        extra: &str,
    ) {
        self.calls.lock().await.push(DispatchCall {
            handler_name: handler_name.to_owned(),
            client_id: client_id.to_owned(),
            event,
            sensor_id: sensor_id.to_owned(),
            extra: extra.to_owned(),
        });
    }
}

/// Records every logged row instead of writing a file.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    pub rows: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
    pub fn new() -> RecordingLogger {
        RecordingLogger::default()
    }
}

impl Logger for RecordingLogger {
    async fn log_event(&self, record: &LogRecord) -> Result<(), LoggerError> {
        self.rows.lock().await.push(record.clone());
        Ok(())
    }
}

/// A scripted phone line: the test preloads the sequence of DTMF chunks the
/// "far end" will send back, and whether/when the call answers.
pub struct FakeTelephony {
    answers: bool,
    inbound: Mutex<VecDeque<Vec<u8>>>,
    pub sent: Mutex<Vec<Vec<u8>>>,
    pub parked: Mutex<bool>,
}

pub struct FakeCall;

impl FakeTelephony {
    pub fn new(answers: bool) -> FakeTelephony {
        FakeTelephony {
            answers,
            inbound: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            parked: Mutex::new(false),
        }
    }

    pub async fn push_inbound(&self, chunk: impl Into<Vec<u8>>) {
        self.inbound.lock().await.push_back(chunk.into());
    }
}

impl Telephony for FakeTelephony {
    type Call = FakeCall;

    async fn originate_call(
        &self,
        _dialstr: &str,
        _answer_timeout: Duration,
    ) -> Result<FakeCall, TelephonyError> {
        if self.answers {
            Ok(FakeCall)
        } else {
            Err(TelephonyError::NoAnswer)
        }
    }

    async fn send_dtmf(&self, _call: &mut FakeCall, payload: &[u8]) -> Result<(), TelephonyError> {
        self.sent.lock().await.push(payload.to_vec());
        Ok(())
    }

    async fn read_dtmf(
        &self,
        _call: &mut FakeCall,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TelephonyError> {
        self.inbound
            .lock()
            .await
            .pop_front()
            .ok_or(TelephonyError::Timeout)
    }

    async fn park_autoservice(
        &self,
        _call: FakeCall,
        _idle_hold: Duration,
    ) -> Result<(), TelephonyError> {
        *self.parked.lock().await = true;
        Ok(())
    }

    async fn hang_up(&self, _call: FakeCall) -> Result<(), TelephonyError> {
        Ok(())
    }

    async fn collect_dtmf(
        &self,
        _device: &str,
        _prompt_audio: Option<&str>,
        _max_len: usize,
        _timeout: Duration,
    ) -> Result<String, TelephonyError> {
        let chunk = self
            .inbound
            .lock()
            .await
            .pop_front()
            .ok_or(TelephonyError::Timeout)?;
        String::from_utf8(chunk).map_err(|e| TelephonyError::Io(e.to_string()))
    }

    async fn play_tone(&self, _device: &str, _confirm: bool) -> Result<(), TelephonyError> {
        Ok(())
    }
}

/// Shared-ownership convenience: most service code holds these behind `Arc`.
pub type SharedFakeClock = Arc<FakeClock>;
pub type SharedFakeTelephony = Arc<FakeTelephony>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_clock_advances_on_demand() {
        let clock = FakeClock::new(100);
        assert_eq!(clock.now_secs().await, 100);
        clock.advance(5);
        assert_eq!(clock.now_secs().await, 105);
    }

    #[tokio::test]
    async fn recording_dispatch_captures_calls_in_order() {
        let dispatch = RecordingDispatch::new();
        dispatch
            .invoke("on_trigger", "A01", EventKind::SensorTriggered, "S1", "160")
            .await;
        let calls = dispatch.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].handler_name, "on_trigger");
    }

    #[tokio::test]
    async fn fake_telephony_round_trips_dtmf() {
        let phone = FakeTelephony::new(true);
        phone.push_inbound(b"*".to_vec()).await;
        let mut call = phone
            .originate_call("555-0100", Duration::from_secs(30))
            .await
            .unwrap();
        phone.send_dtmf(&mut call, b"A01*").await.unwrap();
        let reply = phone.read_dtmf(&mut call, Duration::from_secs(5)).await.unwrap();
        assert_eq!(reply, b"*");
        phone.park_autoservice(call, Duration::from_secs(30)).await.unwrap();
        assert!(*phone.parked.lock().await);
    }

    #[tokio::test]
    async fn fake_telephony_no_answer_is_terminal() {
        let phone = FakeTelephony::new(false);
        let result = phone.originate_call("555-0100", Duration::from_secs(30)).await;
        assert!(matches!(result, Err(TelephonyError::NoAnswer)));
    }
}
