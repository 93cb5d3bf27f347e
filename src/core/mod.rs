//! # Core Wire Layer
//!
//! The byte-level building blocks of the transport: the 24-bit length codec,
//! the packet type, the chunk reassembly buffer, the sans-io frame
//! decoder/encoder, and the tokio codec adapter built on the same rules.

pub mod codec;
pub mod framer;
pub mod packet;
pub mod reassembly;
pub mod uint24;

pub use codec::PacketCodec;
pub use framer::PacketFramer;
pub use packet::{Packet, HEADER_LEN, MAX_PACKET_SIZE};
pub use reassembly::{Dequeue, ReassemblyBuffer};
