//! # Packet
//!
//! The discrete message unit of the transport: a one-byte id tag followed by
//! an opaque content buffer. Packets are ephemeral: decoded from the wire
//! and handed to the application immediately, or built by the application and
//! consumed immediately by the framer on encode.

use bytes::Bytes;

/// Max allowed packet content size (1 MiB). A declared length above this is
/// a protocol violation and the connection must close.
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Wire header size: one id byte plus a three-byte length prefix.
pub const HEADER_LEN: usize = 4;

/// One framed message: `[id][uint24 length][content]` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Application-defined packet type tag.
    pub id: u8,
    /// Opaque content bytes; at most [`MAX_PACKET_SIZE`].
    pub content: Bytes,
}

impl Packet {
    /// Create a packet from an id and content bytes.
    pub fn new(id: u8, content: impl Into<Bytes>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// True when the packet carries no content.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Total encoded size on the wire, header included.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.content.len()
    }
}
