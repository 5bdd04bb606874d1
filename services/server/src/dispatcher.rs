//! The server listener task (§4.8): one `tokio` task owning the UDP
//! socket, decoding each datagram, authenticating it against the
//! registry, feeding it through the reconciler, and replying with an ACK.

use std::collections::HashMap;
use std::net::SocketAddr;

use alarm_core::reporter::SeqOutcome;
use alarm_host::interfaces::{Clock, HandlerDispatch, LogRecord, Logger};
use alarm_protocol::{self as proto, EventKind};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::registry::ClientRegistry;

/// Run the listener loop until the socket errors out or the process is
/// killed; recv errors on an unconnected UDP socket are logged and do not
/// end the loop (they reflect the *previous* datagram's delivery, per
/// `recvfrom(2)`, not this one).
pub async fn run<C, L, H>(
    socket: &UdpSocket,
    registry: &ClientRegistry,
    clock: &C,
    logger: &L,
    dispatch: &H,
    handlers: &HashMap<String, String>,
) where
    C: Clock,
    L: Logger,
    H: HandlerDispatch,
{
    let mut buf = vec![0u8; proto::MAX_FRAME_LEN];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "UDP recv_from failed");
                continue;
            }
        };
        handle_datagram(&buf[..len], peer, socket, registry, clock, logger, dispatch, handlers)
            .await;
    }
}

async fn handle_datagram<C, L, H>(
    bytes: &[u8],
    peer: SocketAddr,
    socket: &UdpSocket,
    registry: &ClientRegistry,
    clock: &C,
    logger: &L,
    dispatch: &H,
    handlers: &HashMap<String, String>,
) where
    C: Clock,
    L: Logger,
    H: HandlerDispatch,
{
    let msg = match proto::decode(bytes) {
        Ok(m) => m,
        Err(e) => {
            warn!(%peer, error = %e, "dropping malformed datagram");
            return;
        }
    };

    let Some(client) = registry.get(&msg.client_id).await else {
        info!(client_id = %msg.client_id, %peer, "unknown client id, dropping");
        return;
    };

    let now = clock.now_secs().await;
    let outcome = {
        let mut guard = client.lock().await;
        if !guard.pin_matches(&msg.pin) {
            info!(client_id = %msg.client_id, %peer, "PIN mismatch, dropping");
            return;
        }
        guard.on_datagram(&msg, now)
    };

    match outcome.seq_outcome {
        SeqOutcome::Accepted | SeqOutcome::Ping => {
            debug!(
                client_id = %msg.client_id,
                event = msg.event.name(),
                seq = ?msg.seq,
                "accepted"
            );
            let _ = logger
                .log_event(&LogRecord {
                    timestamp_secs: now,
                    client_id: msg.client_id.clone(),
                    seq: msg.seq,
                    mmss: msg.mmss,
                    event: msg.event,
                    sensor_id: msg.sensor_id.clone(),
                    extra: msg.extra.clone(),
                })
                .await;
            if let Some(handler) = handlers.get(msg.event.name()) {
                dispatch
                    .invoke(handler, &msg.client_id, msg.event, &msg.sensor_id, &msg.extra)
                    .await;
            }
        }
        SeqOutcome::Duplicate => {
            debug!(client_id = %msg.client_id, seq = ?msg.seq, "duplicate, re-acking");
        }
        SeqOutcome::Gap => {
            debug!(client_id = %msg.client_id, seq = ?msg.seq, "sequence gap, withholding ack");
        }
    }

    if outcome.became_connected {
        info!(client_id = %msg.client_id, "connectivity restored");
        let _ = logger
            .log_event(&LogRecord {
                timestamp_secs: now,
                client_id: msg.client_id.clone(),
                seq: None,
                mmss: None,
                event: EventKind::InternetRestored,
                sensor_id: String::new(),
                extra: String::new(),
            })
            .await;
        if let Some(handler) = handlers.get(EventKind::InternetRestored.name()) {
            dispatch
                .invoke(handler, &msg.client_id, EventKind::InternetRestored, "", "")
                .await;
        }
    }

    if let Some(next_expected) = outcome.ack {
        let ack = proto::encode_ack(Some(next_expected));
        if let Err(e) = socket.send_to(&ack, peer).await {
            warn!(%peer, error = %e, "failed to send ack");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alarm_host::config::{ReporterConfig, ServerConfig};
    use alarm_host::fakes::{FakeClock, RecordingDispatch, RecordingLogger};
    use std::net::Ipv4Addr;

    async fn bound_socket() -> UdpSocket {
        UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap()
    }

    #[tokio::test]
    async fn unknown_client_is_dropped_without_ack() {
        let registry = ClientRegistry::from_config(&ServerConfig {
            bindport: 0,
            bindaddr: "127.0.0.1".into(),
            ip_loss_tolerance: 10,
            logfile: None,
            handlers: HashMap::new(),
            reporters: vec![],
        });
        let clock = FakeClock::new(0);
        let logger = RecordingLogger::new();
        let dispatch = RecordingDispatch::new();
        let server_sock = bound_socket().await;
        let client_sock = bound_socket().await;
        let server_addr = server_sock.local_addr().unwrap();

        let frame = proto::encode("A01", "", Some(1), None, EventKind::Okay, "", "");
        client_sock.send_to(&frame, server_addr).await.unwrap();

        let mut buf = vec![0u8; 256];
        let (len, peer) = server_sock.recv_from(&mut buf).await.unwrap();
        handle_datagram(
            &buf[..len],
            peer,
            &server_sock,
            &registry,
            &clock,
            &logger,
            &dispatch,
            &HashMap::new(),
        )
        .await;

        assert!(logger.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn accepted_event_gets_acked_and_logged() {
        let registry = ClientRegistry::from_config(&ServerConfig {
            bindport: 0,
            bindaddr: "127.0.0.1".into(),
            ip_loss_tolerance: 10,
            logfile: None,
            handlers: HashMap::new(),
            reporters: vec![ReporterConfig {
                client_id: "A01".into(),
                pin: None,
            }],
        });
        let clock = FakeClock::new(42);
        let logger = RecordingLogger::new();
        let dispatch = RecordingDispatch::new();
        let server_sock = bound_socket().await;
        let client_sock = bound_socket().await;
        let server_addr = server_sock.local_addr().unwrap();
        let client_addr = client_sock.local_addr().unwrap();

        let frame = proto::encode("A01", "", Some(1), None, EventKind::Okay, "", "");
        client_sock.send_to(&frame, server_addr).await.unwrap();
        let mut buf = vec![0u8; 256];
        let (len, peer) = server_sock.recv_from(&mut buf).await.unwrap();
        handle_datagram(
            &buf[..len],
            peer,
            &server_sock,
            &registry,
            &clock,
            &logger,
            &dispatch,
            &HashMap::new(),
        )
        .await;

        assert_eq!(logger.rows.lock().await.len(), 1);
        let mut ack_buf = vec![0u8; 64];
        let (ack_len, ack_peer) = client_sock.recv_from(&mut ack_buf).await.unwrap();
        assert_eq!(ack_peer, server_addr);
        assert_eq!(proto::decode_ack(&ack_buf[..ack_len]).unwrap(), Some(2));
        let _ = client_addr;
    }
}
