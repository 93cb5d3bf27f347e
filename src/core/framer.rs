//! # Packet Framer
//!
//! Decodes `[id][uint24 length][content]` frames out of a
//! [`ReassemblyBuffer`] and encodes outbound packets into the same layout.
//!
//! The framer is sans-io: it never touches a socket. The receive path
//! enqueues raw chunks into the buffer and calls [`PacketFramer::decode_next`]
//! until it returns `Ok(None)`, then waits for more data. Header and content
//! are only dequeued once `total_len()` covers them, so the buffer's lossy
//! short-dequeue path is never taken in normal operation; if it fires anyway
//! the error is connection-fatal.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::core::packet::{Packet, HEADER_LEN, MAX_PACKET_SIZE};
use crate::core::reassembly::{Dequeue, ReassemblyBuffer};
use crate::core::uint24;
use crate::error::{Result, TransportError};

/// Incremental frame decoder.
///
/// Remembers a consumed header across calls so a frame whose content has not
/// fully arrived yet can be completed later without re-reading the header.
#[derive(Debug, Default)]
pub struct PacketFramer {
    /// Header already consumed from the buffer: `(id, content length)`.
    pending: Option<(u8, usize)>,
}

impl PacketFramer {
    /// Create a framer with no partially decoded frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next complete frame, if enough bytes are buffered.
    ///
    /// Returns `Ok(None)` until a full header (and then the declared content
    /// length) is available; the caller retries once more data arrives.
    ///
    /// # Errors
    /// - `TransportError::OversizedPacket` if the declared length exceeds
    ///   [`MAX_PACKET_SIZE`]. Raised before any content bytes are consumed;
    ///   the connection must close.
    /// - `TransportError::TruncatedRead` if the buffer unexpectedly ran dry
    ///   mid-dequeue (defensive; fatal for the connection).
    pub fn decode_next(&mut self, buffer: &ReassemblyBuffer) -> Result<Option<Packet>> {
        if self.pending.is_none() {
            if buffer.total_len() < HEADER_LEN {
                return Ok(None);
            }
            let header = dequeue_exact(buffer, HEADER_LEN)?;
            let id = header[0];
            let declared = uint24::decode(&[header[1], header[2], header[3]]) as usize;
            if declared > MAX_PACKET_SIZE {
                return Err(TransportError::OversizedPacket(declared));
            }
            trace!(id, declared, "frame header decoded");
            self.pending = Some((id, declared));
        }

        let (id, length) = self.pending.expect("header state checked above");
        if buffer.total_len() < length {
            return Ok(None);
        }
        let content = dequeue_exact(buffer, length)?;
        self.pending = None;
        Ok(Some(Packet { id, content }))
    }

    /// Encode a packet as `[id][uint24 length][content]`.
    ///
    /// # Errors
    /// Returns `TransportError::OversizedPacket` if the content exceeds
    /// [`MAX_PACKET_SIZE`]; the sender must reject such packets before
    /// framing.
    pub fn encode(packet: &Packet) -> Result<Bytes> {
        if packet.content.len() > MAX_PACKET_SIZE {
            return Err(TransportError::OversizedPacket(packet.content.len()));
        }
        let length = uint24::encode(packet.content.len() as u32)?;
        let mut frame = BytesMut::with_capacity(packet.wire_len());
        frame.put_u8(packet.id);
        frame.put_slice(&length);
        frame.put_slice(&packet.content);
        Ok(frame.freeze())
    }
}

fn dequeue_exact(buffer: &ReassemblyBuffer, count: usize) -> Result<Bytes> {
    match buffer.try_dequeue_exact(count) {
        Dequeue::Complete(bytes) => Ok(bytes),
        Dequeue::Short(partial) => Err(TransportError::TruncatedRead {
            needed: count,
            drained: partial.len(),
        }),
    }
}
