//! Single cooperating client worker task (§4.7). Waits on the wakeup
//! notify, the IP socket, a poll-interval tick and a shutdown signal; drives
//! the IP transport, the breach timer, and phone fallback.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use alarm_core::AppendOutcome;
use alarm_host::interfaces::{Clock, HandlerDispatch, LogRecord, Logger, Telephony};
use alarm_protocol::EventKind;

use crate::shared::SharedClient;
use crate::{ip_transport, phone_transport};

pub struct WorkerConfig {
    pub ping_interval_secs: u64,
    pub idle_line_hold_secs: u64,
    pub dial_string: Option<String>,
}

/// Worker-private transport bookkeeping. Owned solely by the worker task
/// after startup, per §5 ("the IP socket and the wakeup pipe are owned
/// solely by the worker after creation") — no lock needed.
struct TransportState {
    ip_connected: bool,
    last_ip_ack: u64,
    last_ping_sent: u64,
    probe_sent_for: Option<u64>,
}

pub async fn run<C, T, H, L>(
    shared: Arc<SharedClient>,
    ip_socket: Option<Arc<UdpSocket>>,
    cfg: WorkerConfig,
    clock: &C,
    telephony: &T,
    dispatch: &H,
    logger: &L,
    mut shutdown: watch::Receiver<bool>,
) where
    C: Clock,
    T: Telephony,
    H: HandlerDispatch,
    L: Logger,
{
    let now = clock.now_secs().await;
    let mut ts = TransportState {
        ip_connected: ip_socket.is_some(),
        last_ip_ack: now,
        last_ping_sent: now,
        probe_sent_for: None,
    };

    startup(&shared, ip_socket.as_deref(), clock, dispatch, logger).await;

    let poll = Duration::from_secs(cfg.ping_interval_secs.max(1));
    let mut interval = tokio::time::interval(poll);
    interval.tick().await;
    let mut last_housekeep = now;

    loop {
        tokio::select! {
            _ = shared.notify.notified() => {
                pump_ip_send(&shared, &ip_socket, &mut ts).await;
            }
            ack = recv_ack(&ip_socket) => {
                handle_ack(ack, &shared, &mut ts, clock, dispatch, logger).await;
            }
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }

        let now = clock.now_secs().await;
        check_breach(&shared, now, dispatch, logger).await;

        if now.saturating_sub(last_housekeep) >= cfg.ping_interval_secs || !ts.ip_connected {
            housekeeping(&shared, &ip_socket, &cfg, &mut ts, now, telephony, dispatch, logger).await;
            last_housekeep = now;
        }
    }
}

async fn startup<C, H, L>(shared: &SharedClient, ip_socket: Option<&UdpSocket>, clock: &C, dispatch: &H, logger: &L)
where
    C: Clock,
    H: HandlerDispatch,
    L: Logger,
{
    let now = clock.now_secs().await;
    send_ping_direct(shared, ip_socket, now).await;

    let mut state = shared.state.lock().await;
    let outcome = state.append(EventKind::Okay, mmss_of(now), "", "");
    let seq = seq_of(outcome);
    if let Some(sock) = ip_socket {
        let _ = ip_transport::send_all(sock, &mut state.queue).await;
    }
    let client_id = state.client_id.clone();
    drop(state);
    log_and_dispatch(dispatch, logger, &client_id, now, seq, EventKind::Okay, "", "").await;
}

/// PING never occupies a sequence number or queue slot (§4.4); it is
/// encoded and sent straight to the socket, best-effort.
async fn send_ping_direct(shared: &SharedClient, ip_socket: Option<&UdpSocket>, now: u64) {
    let Some(sock) = ip_socket else { return };
    let state = shared.state.lock().await;
    let frame = alarm_protocol::encode(
        &state.client_id,
        &state.pin,
        None,
        mmss_of(now),
        EventKind::Ping,
        "",
        "",
    );
    drop(state);
    let _ = sock.send(&frame).await;
}

async fn pump_ip_send(shared: &SharedClient, ip_socket: &Option<Arc<UdpSocket>>, ts: &mut TransportState) {
    if !ts.ip_connected {
        return;
    }
    let Some(sock) = ip_socket else { return };
    let mut state = shared.state.lock().await;
    if ip_transport::send_all(sock, &mut state.queue).await.is_err() {
        ts.ip_connected = false;
    }
}

async fn recv_ack(ip_socket: &Option<Arc<UdpSocket>>) -> Result<Option<u32>, ip_transport::IpError> {
    match ip_socket {
        Some(sock) => ip_transport::recv_ack(sock).await,
        None => std::future::pending().await,
    }
}

async fn handle_ack<C, H, L>(
    ack: Result<Option<u32>, ip_transport::IpError>,
    shared: &SharedClient,
    ts: &mut TransportState,
    clock: &C,
    dispatch: &H,
    logger: &L,
) where
    C: Clock,
    H: HandlerDispatch,
    L: Logger,
{
    let now = clock.now_secs().await;
    match ack {
        Ok(next_expected) => {
            let was_connected = ts.ip_connected;
            ts.ip_connected = true;
            ts.last_ip_ack = now;
            ts.probe_sent_for = None;
            if let Some(seq) = next_expected {
                shared.state.lock().await.queue.purge(seq);
            }
            if !was_connected {
                let client_id = shared.state.lock().await.client_id.clone();
                log_and_dispatch(dispatch, logger, &client_id, now, None, EventKind::InternetRestored, "", "").await;
            }
        }
        Err(_) => {
            ts.ip_connected = false;
        }
    }
}

async fn check_breach<H, L>(shared: &SharedClient, now: u64, dispatch: &H, logger: &L)
where
    H: HandlerDispatch,
    L: Logger,
{
    let mut state = shared.state.lock().await;
    if state.check_breach(now) {
        let client_id = state.client_id.clone();
        drop(state);
        log_and_dispatch(dispatch, logger, &client_id, now, None, EventKind::Breach, "", "").await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn housekeeping<T, H, L>(
    shared: &SharedClient,
    ip_socket: &Option<Arc<UdpSocket>>,
    cfg: &WorkerConfig,
    ts: &mut TransportState,
    now: u64,
    telephony: &T,
    dispatch: &H,
    logger: &L,
) where
    T: Telephony,
    H: HandlerDispatch,
    L: Logger,
{
    let silence = now.saturating_sub(ts.last_ip_ack);
    let two_intervals = cfg.ping_interval_secs * 2;
    let three_intervals = cfg.ping_interval_secs * 3;

    if ts.ip_connected {
        if silence > three_intervals {
            ts.ip_connected = false;
            let client_id = shared.state.lock().await.client_id.clone();
            log_and_dispatch(dispatch, logger, &client_id, now, None, EventKind::InternetLost, "", "").await;
        } else if silence > two_intervals && ts.probe_sent_for != Some(ts.last_ip_ack) {
            send_ping_direct(shared, ip_socket.as_deref(), now).await;
            ts.probe_sent_for = Some(ts.last_ip_ack);
        }
        return;
    }

    if let Some(dial) = &cfg.dial_string {
        let snapshot = {
            let state = shared.state.lock().await;
            if state.queue.is_empty() {
                None
            } else {
                Some((
                    state.client_id.clone(),
                    state.pin.clone(),
                    state.queue.iter().map(|e| e.frame.clone()).collect::<Vec<_>>(),
                ))
            }
        };
        if let Some((client_id, pin, frames)) = snapshot {
            let idle_hold = Duration::from_secs(cfg.idle_line_hold_secs);
            if let Ok(next_expected) =
                phone_transport::run_call(telephony, dial, &client_id, &pin, &frames, idle_hold).await
            {
                let mut state = shared.state.lock().await;
                state.queue.purge(next_expected);
                state.queue.mark_attempt_all();
            }
        }
    }

    if ip_socket.is_some() && now.saturating_sub(ts.last_ping_sent) >= cfg.ping_interval_secs / 2 {
        send_ping_direct(shared, ip_socket.as_deref(), now).await;
        ts.last_ping_sent = now;
    }
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
    dispatch.invoke(event.name(), client_id, event, sensor_id, extra).await;
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
    use alarm_core::{ClientRuntimeState, Sensor};
    use alarm_host::fakes::{FakeClock, FakeTelephony, RecordingDispatch, RecordingLogger};
    use std::net::Ipv4Addr;

    fn client() -> SharedClient {
        let mut c = ClientRuntimeState::new("A01", "1234", 30);
        c.add_sensor(Sensor::new("S1", 60));
        SharedClient::new(c)
    }

    #[tokio::test]
    async fn startup_emits_ping_and_okay_and_sends_over_ip() {
        let shared = client();
        let server = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let client_sock = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        client_sock.connect(server.local_addr().unwrap()).await.unwrap();
        server.connect(client_sock.local_addr().unwrap()).await.unwrap();

        let clock = FakeClock::new(1000);
        let dispatch = RecordingDispatch::new();
        let logger = RecordingLogger::new();

        startup(&shared, Some(&client_sock), &clock, &dispatch, &logger).await;

        // PING sent directly (best-effort, not queued); OKAY queued and sent.
        let mut buf = [0u8; 256];
        let len = server.recv(&mut buf).await.unwrap();
        let decoded = alarm_protocol::decode(&buf[..len]).unwrap();
        assert_eq!(decoded.event, EventKind::Ping);

        assert_eq!(shared.state.lock().await.queue.len(), 1);
        assert_eq!(dispatch.calls.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn handle_ack_purges_and_emits_internet_restored_on_reconnect() {
        let shared = client();
        shared.state.lock().await.append(EventKind::Okay, None, "", "");
        let clock = FakeClock::new(1000);
        let dispatch = RecordingDispatch::new();
        let logger = RecordingLogger::new();
        let mut ts = TransportState {
            ip_connected: false,
            last_ip_ack: 900,
            last_ping_sent: 900,
            probe_sent_for: None,
        };

        handle_ack(Ok(Some(2)), &shared, &mut ts, &clock, &dispatch, &logger).await;

        assert!(ts.ip_connected);
        assert!(shared.state.lock().await.queue.is_empty());
        let calls = dispatch.calls.lock().await;
        assert!(calls.iter().any(|c| c.event == EventKind::InternetRestored));
    }

    #[tokio::test]
    async fn housekeeping_flips_to_disconnected_after_three_intervals_of_silence() {
        let shared = client();
        let clock = FakeClock::new(1000);
        let telephony = FakeTelephony::new(false);
        let dispatch = RecordingDispatch::new();
        let logger = RecordingLogger::new();
        let cfg = WorkerConfig {
            ping_interval_secs: 5,
            idle_line_hold_secs: 30,
            dial_string: None,
        };
        let mut ts = TransportState {
            ip_connected: true,
            last_ip_ack: 1000,
            last_ping_sent: 1000,
            probe_sent_for: None,
        };

        housekeeping(&shared, &None, &cfg, &mut ts, 1016, &telephony, &dispatch, &logger).await;

        assert!(!ts.ip_connected);
        let calls = dispatch.calls.lock().await;
        assert!(calls.iter().any(|c| c.event == EventKind::InternetLost));
    }

    #[tokio::test]
    async fn housekeeping_invokes_phone_transport_when_disconnected_with_queued_work() {
        let shared = client();
        shared.state.lock().await.append(EventKind::Okay, None, "", "");
        let clock = FakeClock::new(1000);
        let telephony = FakeTelephony::new(true);
        telephony.push_inbound(b"*".to_vec()).await;
        telephony.push_inbound(b"2#".to_vec()).await;
        let dispatch = RecordingDispatch::new();
        let logger = RecordingLogger::new();
        let cfg = WorkerConfig {
            ping_interval_secs: 5,
            idle_line_hold_secs: 30,
            dial_string: Some("555-0100".to_owned()),
        };
        let mut ts = TransportState {
            ip_connected: false,
            last_ip_ack: 900,
            last_ping_sent: 900,
            probe_sent_for: None,
        };

        housekeeping(&shared, &None, &cfg, &mut ts, 1000, &telephony, &dispatch, &logger).await;

        assert!(shared.state.lock().await.queue.is_empty());
        assert!(*telephony.parked.lock().await);
    }
}
