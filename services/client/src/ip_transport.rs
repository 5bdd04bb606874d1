//! IP transport (§4.5): a connected UDP socket to the server endpoint.
//! `send_all` iterates the current queue best-effort; `recv_ack` reads one
//! datagram and decodes it as an ack/ping-ack.

use alarm_core::EventQueue;
use alarm_protocol::MAX_FRAME_LEN;
use tokio::net::UdpSocket;

#[derive(Debug)]
pub enum IpError {
    Send(String),
    Recv(String),
    Decode(String),
}

impl std::fmt::Display for IpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpError::Send(s) => write!(f, "UDP send failed: {s}"),
            IpError::Recv(s) => write!(f, "UDP recv failed: {s}"),
            IpError::Decode(s) => write!(f, "malformed ack: {s}"),
        }
    }
}

impl std::error::Error for IpError {}

/// Transmit every currently-queued frame best-effort. Stops at the first
/// send failure (the socket is presumed down) and marks every entry as
/// attempted regardless, matching the "attempts is diagnostics-only" rule
/// of §4.4.
pub async fn send_all(socket: &UdpSocket, queue: &mut EventQueue) -> Result<(), IpError> {
    let mut result = Ok(());
    for entry in queue.iter() {
        if let Err(e) = socket.send(&entry.frame).await {
            result = Err(IpError::Send(e.to_string()));
            break;
        }
    }
    queue.mark_attempt_all();
    result
}

/// Read one datagram and decode it as an ack (`Some(next_expected_seq)`) or
/// a bare ping-ack (`None`, per codec — caller treats either as "still
/// connected").
pub async fn recv_ack(socket: &UdpSocket) -> Result<Option<u32>, IpError> {
    let mut buf = [0u8; MAX_FRAME_LEN];
    let len = socket
        .recv(&mut buf)
        .await
        .map_err(|e| IpError::Recv(e.to_string()))?;
    alarm_protocol::decode_ack(&buf[..len]).map_err(|e| IpError::Decode(e.to_string()))
}
