//! BattlEye RCON datagram format.
//!
//! ## Wire format
//!
//! ```text
//! prefix:    'B' 'E'   (2)
//! crc32:     u32 LE    (4)   over {0xFF} ++ payload
//! separator: 0xFF      (1)
//! payload:   [u8]      (1+)  first byte is the message type
//! ```
//!
//! The separator byte is deliberately part of the checksum input even
//! though it also appears on the wire; this overlap is required for
//! interoperability with real servers.
//!
//! Payload types: `0x00` login, `0x01` command / command response,
//! `0x02` server message / server-message ack. Types `0x01` and `0x02`
//! carry an 8-bit sequence number immediately after the type byte.

use crc32fast::Hasher;

use crate::error::{RconError, Result};

/// Two-byte ASCII packet prefix.
pub const PREFIX: [u8; 2] = [b'B', b'E'];

/// Separator between header and payload; included in the checksum.
pub const SEPARATOR: u8 = 0xFF;

/// Bytes of header preceding the payload.
pub const HEADER_LEN: usize = 7;

// ── Message types ────────────────────────────────────────────────

/// Payload type discriminants.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeMessageType {
    /// Login request / login response.
    Login = 0x00,
    /// Command request / command response.
    Command = 0x01,
    /// Server-pushed message / its acknowledgement.
    Message = 0x02,
}

impl TryFrom<u8> for BeMessageType {
    type Error = RconError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(BeMessageType::Login),
            0x01 => Ok(BeMessageType::Command),
            0x02 => Ok(BeMessageType::Message),
            other => Err(RconError::InvalidPacket(format!(
                "unknown payload type {other:#04x}"
            ))),
        }
    }
}

// ── Checksum ─────────────────────────────────────────────────────

/// CRC32 over `{0xFF} ++ payload`, as carried in the packet header.
///
/// Standard polynomial `0xEDB88320`, initial `0xFFFFFFFF`, final XOR
/// with `0xFFFFFFFF` — the IEEE CRC32 computed by `crc32fast`.
pub fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[SEPARATOR]);
    hasher.update(payload);
    hasher.finalize()
}

// ── Build / parse ────────────────────────────────────────────────

/// Assemble a datagram around `payload`.
pub fn build(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&PREFIX);
    out.extend_from_slice(&checksum(payload).to_le_bytes());
    out.push(SEPARATOR);
    out.extend_from_slice(payload);
    out
}

/// Validate a datagram and return its payload.
///
/// Rejects short datagrams, a wrong prefix or separator, and checksum
/// mismatches. Callers drop rejected datagrams silently: peers sharing
/// the UDP port may deliver unrelated traffic.
pub fn parse(datagram: &[u8]) -> Result<&[u8]> {
    if datagram.len() < HEADER_LEN {
        return Err(RconError::InvalidPacket(format!(
            "datagram of {} bytes",
            datagram.len()
        )));
    }
    if datagram[0..2] != PREFIX {
        return Err(RconError::InvalidPacket("missing BE prefix".to_string()));
    }
    if datagram[6] != SEPARATOR {
        return Err(RconError::InvalidPacket("missing separator".to_string()));
    }

    let carried = u32::from_le_bytes([datagram[2], datagram[3], datagram[4], datagram[5]]);
    let payload = &datagram[HEADER_LEN..];
    let computed = checksum(payload);
    if carried != computed {
        return Err(RconError::InvalidPacket(format!(
            "crc mismatch: carried {carried:#010x}, computed {computed:#010x}"
        )));
    }

    Ok(payload)
}

// ── Typed payloads ───────────────────────────────────────────────

/// A parsed payload, split by message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BePayload {
    /// Login response: `0x01` is success, anything else is rejection.
    LoginResult(u8),
    /// Command response for the given sequence.
    Command { seq: u8, body: Vec<u8> },
    /// Server-pushed message for the given sequence.
    Message { seq: u8, body: Vec<u8> },
}

impl BePayload {
    /// Interpret raw payload bytes.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (&type_byte, rest) = payload.split_first().ok_or_else(|| {
            RconError::InvalidPacket("empty payload".to_string())
        })?;

        match BeMessageType::try_from(type_byte)? {
            BeMessageType::Login => {
                let &result = rest.first().ok_or_else(|| {
                    RconError::InvalidPacket("login response without result".to_string())
                })?;
                Ok(BePayload::LoginResult(result))
            }
            BeMessageType::Command => {
                let (&seq, body) = rest.split_first().ok_or_else(|| {
                    RconError::InvalidPacket("command payload without sequence".to_string())
                })?;
                Ok(BePayload::Command {
                    seq,
                    body: body.to_vec(),
                })
            }
            BeMessageType::Message => {
                let (&seq, body) = rest.split_first().ok_or_else(|| {
                    RconError::InvalidPacket("message payload without sequence".to_string())
                })?;
                Ok(BePayload::Message {
                    seq,
                    body: body.to_vec(),
                })
            }
        }
    }
}

// ── Payload builders ─────────────────────────────────────────────

/// `{0x00, password}` — the login request.
pub fn login_payload(password: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + password.len());
    payload.push(BeMessageType::Login as u8);
    payload.extend_from_slice(password);
    payload
}

/// `{0x01, seq, command}` — a command request. An empty command doubles
/// as the keep-alive heartbeat.
pub fn command_payload(seq: u8, command: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(2 + command.len());
    payload.push(BeMessageType::Command as u8);
    payload.push(seq);
    payload.extend_from_slice(command);
    payload
}

/// `{0x02, seq}` — acknowledgement of a server-pushed message.
pub fn ack_payload(seq: u8) -> Vec<u8> {
    vec![BeMessageType::Message as u8, seq]
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_separator_alone() {
        // CRC32 of the single byte 0xFF has a fixed, documented value.
        assert_eq!(checksum(&[]), 0xFF00_0000);
    }

    #[test]
    fn checksum_standard_check_value() {
        // IEEE CRC32 check input prefixed by the separator byte.
        let mut hasher = Hasher::new();
        hasher.update(b"123456789");
        assert_eq!(hasher.finalize(), 0xCBF4_3926);
    }

    #[test]
    fn build_layout() {
        let payload = login_payload(b"secret");
        let datagram = build(&payload);

        assert_eq!(datagram.len(), HEADER_LEN + payload.len());
        assert_eq!(&datagram[0..2], b"BE");
        assert_eq!(datagram[6], 0xFF);
        assert_eq!(&datagram[7..], &payload[..]);

        let carried = u32::from_le_bytes(datagram[2..6].try_into().unwrap());
        assert_eq!(carried, checksum(&payload));
    }

    #[test]
    fn parse_roundtrip() {
        let payload = command_payload(17, b"players");
        let datagram = build(&payload);
        assert_eq!(parse(&datagram).unwrap(), &payload[..]);
    }

    #[test]
    fn parse_rejects_short_datagram() {
        assert!(parse(b"BE\x00\x00").is_err());
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn parse_rejects_wrong_prefix() {
        let mut datagram = build(&login_payload(b"pw"));
        datagram[0] = b'X';
        assert!(parse(&datagram).is_err());
    }

    #[test]
    fn parse_rejects_wrong_separator() {
        let mut datagram = build(&login_payload(b"pw"));
        datagram[6] = 0x00;
        assert!(parse(&datagram).is_err());
    }

    #[test]
    fn any_payload_corruption_fails_the_crc() {
        let payload = command_payload(3, b"status");
        let reference = build(&payload);

        // Flipping any byte of {0xFF, payload} must invalidate the
        // checksum and get the datagram dropped.
        for index in 6..reference.len() {
            let mut corrupted = reference.clone();
            corrupted[index] ^= 0x01;
            assert!(
                parse(&corrupted).is_err(),
                "corruption at offset {index} was not detected"
            );
        }
    }

    #[test]
    fn payload_decode_variants() {
        assert_eq!(
            BePayload::decode(&[0x00, 0x01]).unwrap(),
            BePayload::LoginResult(0x01)
        );
        assert_eq!(
            BePayload::decode(&command_payload(255, b"ok")).unwrap(),
            BePayload::Command {
                seq: 255,
                body: b"ok".to_vec()
            }
        );
        assert_eq!(
            BePayload::decode(&[0x02, 42, b'h', b'i']).unwrap(),
            BePayload::Message {
                seq: 42,
                body: b"hi".to_vec()
            }
        );
    }

    #[test]
    fn payload_decode_rejects_malformed() {
        assert!(BePayload::decode(&[]).is_err());
        assert!(BePayload::decode(&[0x00]).is_err()); // login without result
        assert!(BePayload::decode(&[0x01]).is_err()); // command without seq
        assert!(BePayload::decode(&[0x07, 0x00]).is_err()); // unknown type
    }

    #[test]
    fn empty_command_body_is_legal() {
        // Heartbeats are empty commands.
        let payload = command_payload(9, b"");
        assert_eq!(
            BePayload::decode(&payload).unwrap(),
            BePayload::Command {
                seq: 9,
                body: Vec::new()
            }
        );
    }

    #[test]
    fn ack_is_type_and_sequence_only() {
        assert_eq!(ack_payload(42), vec![0x02, 42]);
    }
}
