//! # secure-transport
//!
//! Secure, versioned, packet-oriented transport core for byte streams.
//!
//! The crate frames application messages as `[id][uint24 length][content]`
//! packets, negotiates a mutually supported protocol version per connection,
//! and encrypts and digests payload bytes incrementally while they stream,
//! so large payloads never sit in memory whole.
//!
//! ## Layers
//! - [`core`]: uint24 length codec, packet type, chunk reassembly buffer,
//!   sans-io framer, and a tokio codec adapter
//! - [`crypto`]: the streaming AES-256-CBC + plaintext-digest pipeline and
//!   its `Read`/`Write` wrappers
//! - [`protocol`]: deterministic version/algorithm negotiation and the
//!   callback dispatcher
//! - [`service`]: the `SecureSession` tying the layers together over a
//!   connected stream
//! - [`config`], [`error`], [`utils`]: configuration, the error taxonomy,
//!   logging/metrics/timeout support
//!
//! ## Example
//! ```no_run
//! use secure_transport::config::SessionConfig;
//! use secure_transport::service::{PeerVersions, SecureSession};
//!
//! # async fn connect(stream: tokio::net::TcpStream, key: [u8; 32]) -> secure_transport::Result<()> {
//! // The handshake layer produced the peer's version range and a shared key.
//! let peer = PeerVersions { latest: 3, oldest: 1 };
//! let mut session = SecureSession::negotiate(stream, peer, Some(key), SessionConfig::default())?;
//! session.send_packet(0x01, b"hello").await?;
//! let reply = session.recv_packet().await?;
//! println!("reply {} ({} bytes)", reply.id, reply.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod service;
pub mod utils;

pub use error::{Result, TransportError};
