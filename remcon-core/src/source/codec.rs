//! Incremental framing for the Source RCON byte stream.
//!
//! A TCP read carries no packet alignment guarantee: servers
//! legitimately coalesce a response and the following terminator echo
//! into one segment, and large responses arrive split across reads.
//! The decoder therefore frames against a growing buffer and never
//! assumes one read equals one packet.
//!
//! A `size` field outside `10..=4110` means the stream is
//! desynchronised; the buffer is cleared and the bytes dropped
//! (debug-logged), producing no packet.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::RconError;
use crate::source::packet::{SourcePacket, SourcePacketType, MAX_PACKET_SIZE, MIN_PACKET_SIZE};

/// Codec implementing [`Decoder`] and [`Encoder`] for [`SourcePacket`].
#[derive(Debug, Default)]
pub struct SourceCodec;

impl Decoder for SourceCodec {
    type Item = SourcePacket;
    type Error = RconError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < 4 {
                return Ok(None);
            }

            let size = i32::from_le_bytes([src[0], src[1], src[2], src[3]]);
            if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
                // Desynchronised stream. Drop everything buffered and
                // wait for the connection to be torn down or resume.
                debug!(size, dropped = src.len(), "stream desync, clearing buffer");
                src.clear();
                return Ok(None);
            }

            let total = size as usize + 4;
            if src.len() < total {
                // Partial packet; wait for more bytes.
                return Ok(None);
            }

            let frame = src.split_to(total);
            let id = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
            let raw_type = i32::from_le_bytes([frame[8], frame[9], frame[10], frame[11]]);
            // The remaining two bytes are the null trailer.
            let body = frame[12..total - 2].to_vec();

            match SourcePacketType::try_from(raw_type) {
                Ok(packet_type) => {
                    return Ok(Some(SourcePacket {
                        id,
                        packet_type,
                        body,
                    }))
                }
                Err(_) => {
                    // Unknown type: drop this frame and keep framing.
                    debug!(id, raw_type, "dropping packet of unknown type");
                    continue;
                }
            }
        }
    }
}

impl Encoder<SourcePacket> for SourceCodec {
    type Error = RconError;

    fn encode(&mut self, item: SourcePacket, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = item.encode()?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
