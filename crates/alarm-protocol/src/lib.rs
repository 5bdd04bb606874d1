//! Wire codec shared by the IP and phone transports.
//!
//! Frame: `<client_id>'*'<pin>'*'<seq>'*'<mmss>'*'<event_id>'*'<sensor_id>'*'<extra>'#'`.
//! All fields are printable ASCII; empty fields are empty between separators.
//! `client_id` and `sensor_id` use the telenumeric alphabet `0-9,A-D`.
//!
//! The phone-fallback form is the same frame with `client_id` and `pin`
//! stripped (the call handshake already conveyed them) — see
//! [`Message::encode_phone_payload`] / [`decode_phone_payload`].

use std::fmt;

pub const MIN_FRAME_LEN: usize = 3;
pub const MAX_FRAME_LEN: usize = 256;

/// Closed set of event kinds. Numeric ids are fixed across the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Okay,
    SensorTriggered,
    SensorRestored,
    Disarmed,
    TempDisarmed,
    Breach,
    InternetLost,
    InternetRestored,
    Ping,
    /// Any numeric id outside the closed set above.
    Unknown(u32),
}

impl EventKind {
    pub fn id(self) -> u32 {
        match self {
            EventKind::Okay => 1,
            EventKind::SensorTriggered => 2,
            EventKind::SensorRestored => 3,
            EventKind::Disarmed => 4,
            EventKind::TempDisarmed => 5,
            EventKind::Breach => 6,
            EventKind::InternetLost => 7,
            EventKind::InternetRestored => 8,
            EventKind::Ping => 9,
            EventKind::Unknown(id) => id,
        }
    }

    pub fn from_id(id: u32) -> EventKind {
        match id {
            1 => EventKind::Okay,
            2 => EventKind::SensorTriggered,
            3 => EventKind::SensorRestored,
            4 => EventKind::Disarmed,
            5 => EventKind::TempDisarmed,
            6 => EventKind::Breach,
            7 => EventKind::InternetLost,
            8 => EventKind::InternetRestored,
            9 => EventKind::Ping,
            other => EventKind::Unknown(other),
        }
    }

    /// `BREACH`, `INTERNET_LOST`, `INTERNET_RESTORED` are derived locally and
    /// never transmitted by a client.
    pub fn is_inferred(self) -> bool {
        matches!(
            self,
            EventKind::Breach | EventKind::InternetLost | EventKind::InternetRestored
        )
    }

    /// The `SCREAMING_SNAKE_CASE` name used as a handler-map key and a CSV
    /// log column; the inverse of `from_id`/`id` is numeric, this is textual.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Okay => "OKAY",
            EventKind::SensorTriggered => "SENSOR_TRIGGERED",
            EventKind::SensorRestored => "SENSOR_RESTORED",
            EventKind::Disarmed => "DISARMED",
            EventKind::TempDisarmed => "TEMP_DISARMED",
            EventKind::Breach => "BREACH",
            EventKind::InternetLost => "INTERNET_LOST",
            EventKind::InternetRestored => "INTERNET_RESTORED",
            EventKind::Ping => "PING",
            EventKind::Unknown(_) => "UNKNOWN",
        }
    }
}

/// A decoded datagram/DTMF-chunk body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub client_id: String,
    pub pin: String,
    pub seq: Option<u32>,
    pub mmss: Option<(u8, u8)>,
    pub event: EventKind,
    pub sensor_id: String,
    pub extra: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    TooShort,
    TooLong,
    MissingTerminator,
    WrongFieldCount,
    InvalidSeq,
    InvalidMmss,
    InvalidEventId,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TooShort => write!(f, "frame shorter than {MIN_FRAME_LEN} bytes"),
            DecodeError::TooLong => write!(f, "frame longer than {MAX_FRAME_LEN} bytes"),
            DecodeError::MissingTerminator => write!(f, "frame missing '#' terminator"),
            DecodeError::WrongFieldCount => write!(f, "wrong number of '*'-separated fields"),
            DecodeError::InvalidSeq => write!(f, "seq field is not a base-10 integer"),
            DecodeError::InvalidMmss => write!(f, "mmss field is not exactly four digits"),
            DecodeError::InvalidEventId => write!(f, "event_id field is not a base-10 integer"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Encode a full client -> server frame.
#[allow(clippy::too_many_arguments)]
pub fn encode(
    client_id: &str,
    pin: &str,
    seq: Option<u32>,
    mmss: Option<(u8, u8)>,
    event: EventKind,
    sensor_id: &str,
    extra: &str,
) -> Vec<u8> {
    let mut out = String::with_capacity(64);
    out.push_str(client_id);
    out.push('*');
    out.push_str(pin);
    out.push('*');
    if let Some(seq) = seq {
        out.push_str(&seq.to_string());
    }
    out.push('*');
    if let Some((mm, ss)) = mmss {
        out.push_str(&format!("{mm:02}{ss:02}"));
    }
    out.push('*');
    out.push_str(&event.id().to_string());
    out.push('*');
    out.push_str(sensor_id);
    out.push('*');
    out.push_str(extra);
    out.push('#');
    out.into_bytes()
}

/// Decode a full client -> server frame.
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let (client_id, pin, rest) = split_identity(bytes)?;
    let (seq, mmss, event, sensor_id, extra) = decode_body_fields(rest)?;
    Ok(Message {
        client_id: client_id.to_owned(),
        pin: pin.to_owned(),
        seq,
        mmss,
        event,
        sensor_id: sensor_id.to_owned(),
        extra: extra.to_owned(),
    })
}

/// Encode the phone-fallback payload: identical frame with `client_id` and
/// `pin` omitted (the call handshake already conveyed them).
pub fn encode_phone_payload(
    seq: Option<u32>,
    mmss: Option<(u8, u8)>,
    event: EventKind,
    sensor_id: &str,
    extra: &str,
) -> Vec<u8> {
    let mut out = String::with_capacity(48);
    if let Some(seq) = seq {
        out.push_str(&seq.to_string());
    }
    out.push('*');
    if let Some((mm, ss)) = mmss {
        out.push_str(&format!("{mm:02}{ss:02}"));
    }
    out.push('*');
    out.push_str(&event.id().to_string());
    out.push('*');
    out.push_str(sensor_id);
    out.push('*');
    out.push_str(extra);
    out.push('#');
    out.into_bytes()
}

/// Decode a phone-fallback payload (no client id / pin present).
pub struct PhoneBody {
    pub seq: Option<u32>,
    pub mmss: Option<(u8, u8)>,
    pub event: EventKind,
    pub sensor_id: String,
    pub extra: String,
}

pub fn decode_phone_payload(bytes: &[u8]) -> Result<PhoneBody, DecodeError> {
    let (seq, mmss, event, sensor_id, extra) = decode_body_fields(bytes)?;
    Ok(PhoneBody {
        seq,
        mmss,
        event,
        sensor_id: sensor_id.to_owned(),
        extra: extra.to_owned(),
    })
}

/// Strip `client_id` and `pin` from an already-encoded full frame, returning
/// the bytes starting after the second `'*'` (inclusive of the trailing
/// `'#'`). Used by the phone transport, which sends the identity once via
/// the call handshake and then reuses the remainder of each queued frame.
pub fn strip_identity_prefix(full_frame: &[u8]) -> Result<&[u8], DecodeError> {
    let (_, _, rest) = split_identity(full_frame)?;
    Ok(rest)
}

// ---------------------------------------------------------------------------
// ACK frames (server -> client, over IP)
// ---------------------------------------------------------------------------

/// Encode a server ACK: `'*'<next_expected_seq>'#'`, or bare `'*'` for a PING ack.
pub fn encode_ack(next_expected_seq: Option<u32>) -> Vec<u8> {
    match next_expected_seq {
        Some(n) => format!("*{n}#").into_bytes(),
        None => b"*".to_vec(),
    }
}

/// Decode a server ACK. `Ok(None)` is the bare PING ack.
pub fn decode_ack(bytes: &[u8]) -> Result<Option<u32>, DecodeError> {
    if bytes.first() != Some(&b'*') {
        return Err(DecodeError::WrongFieldCount);
    }
    let rest = &bytes[1..];
    if rest.is_empty() {
        return Ok(None);
    }
    let rest = rest
        .strip_suffix(b"#")
        .ok_or(DecodeError::MissingTerminator)?;
    let s = std::str::from_utf8(rest).map_err(|_| DecodeError::InvalidSeq)?;
    s.parse::<u32>().map(Some).map_err(|_| DecodeError::InvalidSeq)
}

/// Encode a phone-fallback ACK: `<next_expected_seq>'#'` (no leading `'*'`,
/// the call is already addressed to a single client).
pub fn encode_phone_ack(next_expected_seq: u32) -> Vec<u8> {
    format!("{next_expected_seq}#").into_bytes()
}

pub fn decode_phone_ack(bytes: &[u8]) -> Result<u32, DecodeError> {
    let rest = bytes
        .strip_suffix(b"#")
        .ok_or(DecodeError::MissingTerminator)?;
    let s = std::str::from_utf8(rest).map_err(|_| DecodeError::InvalidSeq)?;
    s.parse::<u32>().map_err(|_| DecodeError::InvalidSeq)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn split_identity(bytes: &[u8]) -> Result<(&str, &str, &[u8]), DecodeError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(DecodeError::TooShort);
    }
    if bytes.len() > MAX_FRAME_LEN {
        return Err(DecodeError::TooLong);
    }
    if bytes.last() != Some(&b'#') {
        return Err(DecodeError::MissingTerminator);
    }
    let body = std::str::from_utf8(&bytes[..bytes.len() - 1])
        .map_err(|_| DecodeError::WrongFieldCount)?;
    let mut stars = body.match_indices('*');
    let first = stars.next().ok_or(DecodeError::WrongFieldCount)?.0;
    let second = stars.next().ok_or(DecodeError::WrongFieldCount)?.0;
    let client_id = &body[..first];
    let pin = &body[first + 1..second];
    // Re-attach the trailing '#' so decode_body_fields sees a complete frame.
    let rest_start = second + 1;
    let rest = &bytes[rest_start..];
    Ok((client_id, pin, rest))
}

#[allow(clippy::type_complexity)]
fn decode_body_fields(
    bytes: &[u8],
) -> Result<(Option<u32>, Option<(u8, u8)>, EventKind, &str, &str), DecodeError> {
    if bytes.last() != Some(&b'#') {
        return Err(DecodeError::MissingTerminator);
    }
    let body = std::str::from_utf8(&bytes[..bytes.len() - 1])
        .map_err(|_| DecodeError::WrongFieldCount)?;
    let fields: Vec<&str> = body.split('*').collect();
    if fields.len() != 5 {
        return Err(DecodeError::WrongFieldCount);
    }
    let seq = parse_optional_u32(fields[0]).ok_or(DecodeError::InvalidSeq)?;
    let mmss = parse_optional_mmss(fields[1])?;
    let event_id: u32 = if fields[2].is_empty() {
        return Err(DecodeError::InvalidEventId);
    } else {
        fields[2]
            .parse()
            .map_err(|_| DecodeError::InvalidEventId)?
    };
    Ok((seq, mmss, EventKind::from_id(event_id), fields[3], fields[4]))
}

fn parse_optional_u32(field: &str) -> Option<Option<u32>> {
    if field.is_empty() {
        return Some(None);
    }
    field.parse::<u32>().ok().map(Some)
}

fn parse_optional_mmss(field: &str) -> Result<Option<(u8, u8)>, DecodeError> {
    if field.is_empty() {
        return Ok(None);
    }
    if field.len() != 4 || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidMmss);
    }
    let mm: u8 = field[..2].parse().map_err(|_| DecodeError::InvalidMmss)?;
    let ss: u8 = field[2..].parse().map_err(|_| DecodeError::InvalidMmss)?;
    Ok(Some((mm, ss)))
}
