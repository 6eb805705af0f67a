//! BattlEye RCON: UDP transport, CRC32-checked datagrams, sequence
//! numbers, server-message acknowledgement, keep-alive heartbeat.

pub mod client;
pub mod packet;

pub use client::{BattlEyeClient, HEARTBEAT_INTERVAL};
pub use packet::{BeMessageType, BePayload};
