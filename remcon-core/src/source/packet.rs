//! Source RCON packet structure and wire encoding.
//!
//! ## Wire format (little-endian)
//!
//! ```text
//! size:  i32  (4)   counts id + type + body + trailer, not itself
//! id:    i32  (4)
//! type:  i32  (4)
//! body:  [u8] (size - 10)
//! trailer: 0x00 0x00
//! ```
//!
//! `size` is valid in `10..=4110`, so a body carries at most 4100 bytes.

use crate::error::{RconError, Result};

/// Smallest legal value of the `size` field (empty body).
pub const MIN_PACKET_SIZE: i32 = 10;

/// Largest legal value of the `size` field.
pub const MAX_PACKET_SIZE: i32 = 4110;

/// Largest body an encoded packet may carry.
pub const MAX_BODY_LEN: usize = (MAX_PACKET_SIZE - MIN_PACKET_SIZE) as usize;

// ── SourcePacketType ─────────────────────────────────────────────

/// Packet type discriminants defined by the Source RCON protocol.
///
/// The value `2` is deliberately overloaded by the protocol: it is
/// `SERVERDATA_EXECCOMMAND` in a request and `SERVERDATA_AUTH_RESPONSE`
/// in a reply. Which meaning applies follows from the direction and the
/// session phase, never from the value alone.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePacketType {
    /// `SERVERDATA_RESPONSE_VALUE` — a command response fragment, or
    /// the empty sentinel request used to terminate one.
    Response = 0,
    /// `SERVERDATA_EXECCOMMAND` / `SERVERDATA_AUTH_RESPONSE`.
    ExecCommand = 2,
    /// `SERVERDATA_AUTH` — the authentication request.
    Auth = 3,
}

impl TryFrom<i32> for SourcePacketType {
    type Error = RconError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(SourcePacketType::Response),
            2 => Ok(SourcePacketType::ExecCommand),
            3 => Ok(SourcePacketType::Auth),
            other => Err(RconError::InvalidPacket(format!(
                "unknown packet type {other}"
            ))),
        }
    }
}

// ── SourcePacket ─────────────────────────────────────────────────

/// A single Source RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePacket {
    pub id: i32,
    pub packet_type: SourcePacketType,
    pub body: Vec<u8>,
}

impl SourcePacket {
    pub fn new(id: i32, packet_type: SourcePacketType, body: Vec<u8>) -> Self {
        Self {
            id,
            packet_type,
            body,
        }
    }

    /// An authentication request carrying the password as its body.
    pub fn auth(id: i32, password: Vec<u8>) -> Self {
        Self::new(id, SourcePacketType::Auth, password)
    }

    /// A command execution request.
    pub fn command(id: i32, body: Vec<u8>) -> Self {
        Self::new(id, SourcePacketType::ExecCommand, body)
    }

    /// The empty sentinel request whose echo marks the end of the
    /// preceding command's possibly fragmented response.
    pub fn terminator(id: i32) -> Self {
        Self::new(id, SourcePacketType::Response, Vec::new())
    }

    /// A response packet (used by servers and test fixtures).
    pub fn response(id: i32, body: Vec<u8>) -> Self {
        Self::new(id, SourcePacketType::Response, body)
    }

    /// The value of the `size` field for this packet.
    pub fn wire_size(&self) -> i32 {
        MIN_PACKET_SIZE + self.body.len() as i32
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Serialize to the byte-stream representation.
    ///
    /// Rejects bodies that would push `size` past [`MAX_PACKET_SIZE`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        let size = self.wire_size();
        if size > MAX_PACKET_SIZE {
            return Err(RconError::InvalidPacket(format!(
                "packet size {size} exceeds maximum {MAX_PACKET_SIZE}"
            )));
        }

        let mut out = Vec::with_capacity(size as usize + 4);
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&(self.packet_type as i32).to_le_bytes());
        out.extend_from_slice(&self.body);
        out.push(0x00);
        out.push(0x00);
        Ok(out)
    }
}

// ── Tests ────────────────────────────────────────────────────────
