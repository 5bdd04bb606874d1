//! DTMF-over-voice-call fallback transport (§4.6). Half-duplex: each leg
//! of the handshake is a single `Telephony::send_dtmf`/`read_dtmf` round
//! trip on the same live call.
//!
//! Takes a snapshot of already-encoded frames rather than the live queue:
//! the worker copies out what's pending while holding the queue lock only
//! briefly, then releases it before this function's suspension points
//! (dial, DTMF send/read can each take seconds). The caller purges the
//! queue itself once this returns the accepted sequence number.

use std::time::Duration;

use alarm_host::interfaces::{Telephony, TelephonyError};

const ANSWER_TIMEOUT: Duration = Duration::from_secs(30);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);
const ACK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub enum PhoneError {
    Telephony(TelephonyError),
    Decode(String),
}

impl std::fmt::Display for PhoneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhoneError::Telephony(e) => write!(f, "{e}"),
            PhoneError::Decode(s) => write!(f, "malformed phone frame: {s}"),
        }
    }
}

impl std::error::Error for PhoneError {}

impl From<TelephonyError> for PhoneError {
    fn from(e: TelephonyError) -> PhoneError {
        PhoneError::Telephony(e)
    }
}

/// Run one full call: dial, handshake, send every frame in `queued_frames`
/// (already-encoded full wire frames, oldest first), read the batch ack,
/// and park into autoservice. Returns the server's accepted
/// `next_expected_seq` on success; the caller is responsible for purging
/// the real queue with it. On any failure the call is hung up (not
/// parked) and nothing is purged, so the next idle cycle retries from the
/// same frames.
pub async fn run_call<T: Telephony>(
    telephony: &T,
    dialstr: &str,
    client_id: &str,
    pin: &str,
    queued_frames: &[Vec<u8>],
    idle_hold: Duration,
) -> Result<u32, PhoneError> {
    let mut call = telephony.originate_call(dialstr, ANSWER_TIMEOUT).await?;

    let ready = match telephony.read_dtmf(&mut call, HANDSHAKE_TIMEOUT).await {
        Ok(chunk) => chunk,
        Err(e) => {
            let _ = telephony.hang_up(call).await;
            return Err(e.into());
        }
    };
    if ready != b"*" {
        let _ = telephony.hang_up(call).await;
        return Err(PhoneError::Decode(format!(
            "expected bare '*' handshake, got {ready:?}"
        )));
    }

    if let Err(e) = send_identity(telephony, &mut call, client_id, pin).await {
        let _ = telephony.hang_up(call).await;
        return Err(e);
    }

    for frame in queued_frames {
        let Ok(payload) = alarm_protocol::strip_identity_prefix(frame) else {
            continue;
        };
        if let Err(e) = telephony.send_dtmf(&mut call, payload).await {
            let _ = telephony.hang_up(call).await;
            return Err(e.into());
        }
    }
    if let Err(e) = telephony.send_dtmf(&mut call, b"#").await {
        let _ = telephony.hang_up(call).await;
        return Err(e.into());
    }

    let ack_chunk = match telephony.read_dtmf(&mut call, ACK_TIMEOUT).await {
        Ok(chunk) => chunk,
        Err(e) => {
            let _ = telephony.hang_up(call).await;
            return Err(e.into());
        }
    };
    let next_expected = match alarm_protocol::decode_phone_ack(&ack_chunk) {
        Ok(n) => n,
        Err(e) => {
            let _ = telephony.hang_up(call).await;
            return Err(PhoneError::Decode(e.to_string()));
        }
    };

    telephony.park_autoservice(call, idle_hold).await?;
    Ok(next_expected)
}

async fn send_identity<T: Telephony>(
    telephony: &T,
    call: &mut T::Call,
    client_id: &str,
    pin: &str,
) -> Result<(), PhoneError> {
    telephony
        .send_dtmf(call, format!("{client_id}*").as_bytes())
        .await?;
    telephony
        .send_dtmf(call, format!("{pin}*").as_bytes())
        .await?;
    Ok(())
}
