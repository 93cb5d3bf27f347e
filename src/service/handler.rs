//! Application collaborator contract.
//!
//! The session never calls into the application from its I/O thread: both
//! callbacks below are delivered through an
//! [`Dispatcher`](crate::protocol::dispatch::Dispatcher).

use bytes::Bytes;

use crate::error::TransportError;

/// Why a session ended. Delivered exactly once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the stream cleanly.
    RemoteClosed,
    /// The local side requested teardown.
    LocalClosed,
    /// A frame or negotiation rule was violated.
    ProtocolViolation,
    /// Decrypt-side integrity validation failed.
    IntegrityFailure,
    /// The peer failed to deliver a complete packet in time.
    Timeout,
    /// The underlying stream failed.
    TransportFailure,
    /// An application callback failed.
    ApplicationError,
}

/// Callbacks a transport application implements. Invoked exclusively through
/// the session's dispatcher, never directly from the network thread.
pub trait SessionHandler: Send + Sync {
    /// A packet arrived, was decrypted and verified.
    fn on_packet_received(&self, id: u8, content: Bytes);

    /// The session ended. `error` carries the underlying failure for
    /// non-graceful closes.
    fn on_connection_closed(
        &self,
        reason: CloseReason,
        message: &str,
        error: Option<&TransportError>,
    );
}
