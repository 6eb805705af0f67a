//! Source RCON: TCP transport, request/response over a framed byte
//! stream, terminator-packet response correlation.

pub mod client;
pub mod codec;
pub mod packet;

pub use client::SourceClient;
pub use codec::SourceCodec;
pub use packet::{SourcePacket, SourcePacketType, MAX_BODY_LEN, MAX_PACKET_SIZE, MIN_PACKET_SIZE};
