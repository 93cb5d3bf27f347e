//! Tokio codec adapter for the packet frame layout.
//!
//! Speaks exactly the same wire rules as [`PacketFramer`](crate::core::framer::PacketFramer),
//! `[id][uint24 length][content]` with the length capped at
//! [`MAX_PACKET_SIZE`](crate::core::packet::MAX_PACKET_SIZE), but plugs into
//! `tokio_util::codec::Framed` for callers that drive a socket with the
//! stream/sink combinators instead of the sans-io buffer.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::packet::{Packet, HEADER_LEN, MAX_PACKET_SIZE};
use crate::core::uint24;
use crate::error::TransportError;

/// Stateless codec for `Framed<S, PacketCodec>`.
pub struct PacketCodec;

/// Wrap a connected stream in a `Framed` speaking this codec.
pub fn framed<S>(stream: S) -> tokio_util::codec::Framed<S, PacketCodec>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite,
{
    tokio_util::codec::Framed::new(stream, PacketCodec)
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, TransportError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let declared = uint24::decode(&[src[1], src[2], src[3]]) as usize;
        if declared > MAX_PACKET_SIZE {
            return Err(TransportError::OversizedPacket(declared));
        }
        if src.len() < HEADER_LEN + declared {
            src.reserve(HEADER_LEN + declared - src.len());
            return Ok(None);
        }

        let id = src.get_u8();
        src.advance(uint24::WIDTH);
        let content = src.split_to(declared).freeze();
        Ok(Some(Packet { id, content }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = TransportError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), TransportError> {
        if packet.content.len() > MAX_PACKET_SIZE {
            return Err(TransportError::OversizedPacket(packet.content.len()));
        }
        let length = uint24::encode(packet.content.len() as u32)?;
        dst.reserve(packet.wire_len());
        dst.put_u8(packet.id);
        dst.put_slice(&length);
        dst.put_slice(&packet.content);
        Ok(())
    }
}
