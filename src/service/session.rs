//! # Secure Session
//!
//! The thin layer tying the core together over one connected byte stream:
//! version negotiation fixes the content algorithm, outbound content is
//! sealed through an encrypting pipeline and framed, inbound chunks are
//! reassembled, deframed, opened through a decrypting pipeline, and handed
//! to the application through the dispatcher.
//!
//! The negotiated version and algorithm are set once here and read-only for
//! the session's lifetime. Connection-fatal errors close the session and
//! notify the application exactly once via `on_connection_closed`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

use crate::config::SessionConfig;
use crate::core::framer::PacketFramer;
use crate::core::packet::{Packet, MAX_PACKET_SIZE};
use crate::core::reassembly::ReassemblyBuffer;
use crate::crypto::pipeline::{CryptoMode, CryptoPipeline};
use crate::error::{constants, Result, TransportError};
use crate::protocol::dispatch::Dispatcher;
use crate::protocol::version::{
    algorithm_for_version, negotiate_protocol_version, ContentAlgorithm, ProtocolVersion,
    PROTOCOL_COMPAT_FLOOR, PROTOCOL_VERSION,
};
use crate::service::handler::{CloseReason, SessionHandler};
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout_error;

const READ_CHUNK_LEN: usize = 8 * 1024;

/// Version range the peer advertised during the handshake.
#[derive(Debug, Clone, Copy)]
pub struct PeerVersions {
    pub latest: ProtocolVersion,
    pub oldest: ProtocolVersion,
}

/// One negotiated connection over a byte stream.
pub struct SecureSession<S> {
    stream: S,
    buffer: ReassemblyBuffer,
    framer: PacketFramer,
    version: ProtocolVersion,
    algorithm: ContentAlgorithm,
    key: Option<Zeroizing<[u8; 32]>>,
    config: SessionConfig,
    /// Application-facing close request; cancelling it stops the receive
    /// loop but still lets the close notification through the dispatcher.
    shutdown: CancellationToken,
    /// Dispatcher owner signal; cancelled by the close notification itself,
    /// so it is the last callback the dispatcher executes.
    teardown: CancellationToken,
    last_activity: Instant,
    metrics: &'static Metrics,
}

impl<S> SecureSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Negotiate a version against the peer's advertised range and bind the
    /// resulting algorithm and key to the stream.
    ///
    /// The handshake layer supplies `peer` and the pre-computed shared
    /// `key`; this layer performs no asymmetric exchange.
    ///
    /// # Errors
    /// - `TransportError::VersionMismatch` when no shared version exists.
    /// - `TransportError::Argument` when the negotiated algorithm needs a
    ///   key and none was supplied.
    #[instrument(skip(stream, key, config))]
    pub fn negotiate(
        stream: S,
        peer: PeerVersions,
        key: Option<[u8; 32]>,
        config: SessionConfig,
    ) -> Result<Self> {
        let metrics = Metrics::global();
        let Some(version) = negotiate_protocol_version(
            PROTOCOL_VERSION,
            PROTOCOL_COMPAT_FLOOR,
            peer.latest,
            peer.oldest,
        ) else {
            metrics.negotiation_failed();
            return Err(TransportError::VersionMismatch);
        };

        let algorithm = algorithm_for_version(version);
        let mut key = key;
        let key = match algorithm {
            ContentAlgorithm::None => None,
            _ => {
                let Some(k) = key.take() else {
                    return Err(TransportError::Argument(constants::ERR_KEY_REQUIRED));
                };
                Some(Zeroizing::new(k))
            }
        };

        info!(version, ?algorithm, "session negotiated");
        metrics.session_established();

        Ok(Self {
            stream,
            buffer: ReassemblyBuffer::new(),
            framer: PacketFramer::new(),
            version,
            algorithm,
            key,
            config,
            shutdown: CancellationToken::new(),
            teardown: CancellationToken::new(),
            last_activity: Instant::now(),
            metrics,
        })
    }

    /// The version fixed at negotiation.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The content algorithm fixed at negotiation.
    pub fn algorithm(&self) -> ContentAlgorithm {
        self.algorithm
    }

    /// Cancel the returned token to close the session locally. The receive
    /// loop stops and the application is still notified through the
    /// dispatcher before teardown completes.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Time since the last packet moved in either direction, for the
    /// caller's keepalive/timeout policy.
    pub fn time_since_last_activity(&self) -> Duration {
        self.last_activity.elapsed()
    }

    fn update_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Seal, frame and transmit one packet.
    #[instrument(skip(self, content), level = "debug")]
    pub async fn send_packet(&mut self, id: u8, content: &[u8]) -> Result<()> {
        if content.len() > MAX_PACKET_SIZE {
            return Err(TransportError::OversizedPacket(content.len()));
        }
        let sealed = self.seal(content)?;
        let frame = PacketFramer::encode(&Packet::new(id, sealed))?;

        let deadline = self.config.send_timeout;
        with_timeout_error(
            async {
                self.stream.write_all(&frame).await?;
                self.stream.flush().await?;
                Ok(())
            },
            deadline,
        )
        .await?;

        self.update_activity();
        self.metrics.packet_sent(content.len() as u64);
        debug!(id, bytes = content.len(), "packet sent");
        Ok(())
    }

    /// Receive, deframe, open and verify the next packet.
    ///
    /// # Errors
    /// Connection-fatal errors (`OversizedPacket`, `IntegrityFailure`,
    /// `Timeout`, `ConnectionClosed`, I/O) propagate to the caller; the
    /// session must not be used afterwards.
    #[instrument(skip(self), level = "debug")]
    pub async fn recv_packet(&mut self) -> Result<Packet> {
        let shutdown = self.shutdown.clone();
        loop {
            if shutdown.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            match self.framer.decode_next(&self.buffer) {
                Ok(Some(packet)) => {
                    let content = self.open(&packet.content)?;
                    self.update_activity();
                    self.metrics.packet_received(content.len() as u64);
                    debug!(id = packet.id, bytes = content.len(), "packet received");
                    return Ok(Packet::new(packet.id, content));
                }
                Ok(None) => {}
                Err(err) => {
                    self.metrics.protocol_error();
                    return Err(err);
                }
            }

            let mut chunk = BytesMut::with_capacity(READ_CHUNK_LEN);
            let deadline = self.config.receive_timeout;
            let read = async {
                let n = self.stream.read_buf(&mut chunk).await?;
                Ok(n)
            };
            let received = tokio::select! {
                _ = shutdown.cancelled() => return Err(TransportError::Cancelled),
                result = with_timeout_error(read, deadline) => result?,
            };
            if received == 0 {
                return Err(TransportError::ConnectionClosed);
            }
            self.buffer.enqueue(chunk.freeze());
        }
    }

    /// Drive the receive loop, delivering packets and the final close
    /// notification to `handler` through `dispatcher`.
    ///
    /// Returns `Ok(())` for graceful closes (peer EOF, local cancellation)
    /// and the fatal error otherwise. Either way `on_connection_closed` has
    /// been delivered exactly once before this returns.
    pub async fn run(
        mut self,
        handler: Arc<dyn SessionHandler>,
        dispatcher: Dispatcher,
    ) -> Result<()> {
        dispatcher.assign(self.teardown.clone());
        dispatcher.start();

        let error = loop {
            match self.recv_packet().await {
                Ok(packet) => {
                    let handler = handler.clone();
                    dispatcher.queue_work_item(Box::new(move |_| {
                        handler.on_packet_received(packet.id, packet.content);
                    }));
                }
                Err(err) => break err,
            }
        };

        let (reason, message) = close_context(&error);
        let graceful = matches!(reason, CloseReason::RemoteClosed | CloseReason::LocalClosed);
        if graceful {
            debug!(?reason, message, "session closing");
        } else {
            warn!(?reason, message, error = %error, "session closing on failure");
        }

        self.deliver_close(&handler, &dispatcher, reason, message, &error)
            .await;
        self.metrics.session_closed();

        if graceful {
            Ok(())
        } else {
            Err(error)
        }
    }

    /// Queue the close notification and cancel the teardown token from
    /// within that same callback, so the notification is the last work this
    /// dispatcher executes for the session.
    async fn deliver_close(
        &self,
        handler: &Arc<dyn SessionHandler>,
        dispatcher: &Dispatcher,
        reason: CloseReason,
        message: &'static str,
        error: &TransportError,
    ) {
        let handler = handler.clone();
        let teardown = self.teardown.clone();
        let carried = if matches!(reason, CloseReason::RemoteClosed | CloseReason::LocalClosed) {
            None
        } else {
            Some(describe(error))
        };

        let completion = dispatcher.invoke_async(Box::new(move |_| {
            handler.on_connection_closed(reason, message, carried.as_ref());
            teardown.cancel();
        }));

        match completion {
            Ok(completion) => {
                let delivered = tokio::task::spawn_blocking(move || completion.wait()).await;
                if !matches!(delivered, Ok(Ok(()))) {
                    // The notification was discarded mid-shutdown; make sure
                    // teardown still completes.
                    self.teardown.cancel();
                }
            }
            Err(_) => {
                // Dispatcher was already torn down externally.
                self.teardown.cancel();
            }
        }
        self.shutdown.cancel();
    }

    fn seal(&self, content: &[u8]) -> Result<Bytes> {
        let Some(mut pipeline) =
            CryptoPipeline::for_algorithm(self.algorithm, CryptoMode::Encrypt, self.key.as_deref())?
        else {
            return Ok(Bytes::copy_from_slice(content));
        };
        let mut sealed = Vec::with_capacity(content.len() + 48);
        pipeline.update(content, &mut sealed)?;
        pipeline.finalize(&mut sealed)?;
        self.metrics.payload_encrypted();
        Ok(Bytes::from(sealed))
    }

    fn open(&self, sealed: &[u8]) -> Result<Bytes> {
        let Some(mut pipeline) =
            CryptoPipeline::for_algorithm(self.algorithm, CryptoMode::Decrypt, self.key.as_deref())?
        else {
            return Ok(Bytes::copy_from_slice(sealed));
        };
        let mut content = Vec::with_capacity(sealed.len());
        pipeline.update(sealed, &mut content)?;
        if let Err(err) = pipeline.finalize(&mut content) {
            self.metrics.integrity_failure();
            return Err(err);
        }
        self.metrics.payload_decrypted();
        Ok(Bytes::from(content))
    }
}

fn close_context(error: &TransportError) -> (CloseReason, &'static str) {
    match error {
        TransportError::ConnectionClosed => (CloseReason::RemoteClosed, "peer closed the stream"),
        TransportError::Cancelled => (CloseReason::LocalClosed, "session closed locally"),
        TransportError::Timeout => (
            CloseReason::Timeout,
            "peer failed to deliver a complete packet in time",
        ),
        TransportError::IntegrityFailure => (
            CloseReason::IntegrityFailure,
            "inbound content failed integrity validation",
        ),
        TransportError::OversizedPacket(_)
        | TransportError::InvalidHeader
        | TransportError::TruncatedRead { .. }
        | TransportError::VersionMismatch
        | TransportError::UnsupportedVersion(_) => (
            CloseReason::ProtocolViolation,
            "peer violated the framing protocol",
        ),
        TransportError::Io(_) => (CloseReason::TransportFailure, "underlying stream failed"),
        _ => (CloseReason::TransportFailure, "session failed"),
    }
}

/// Owned copy of the error for the close callback; `TransportError` is not
/// `Clone` because of its I/O variant.
fn describe(error: &TransportError) -> TransportError {
    match error {
        TransportError::Io(e) => TransportError::Io(std::io::Error::new(e.kind(), e.to_string())),
        TransportError::Argument(m) => TransportError::Argument(m),
        TransportError::InvalidHeader => TransportError::InvalidHeader,
        TransportError::OversizedPacket(n) => TransportError::OversizedPacket(*n),
        TransportError::VersionMismatch => TransportError::VersionMismatch,
        TransportError::UnsupportedVersion(v) => TransportError::UnsupportedVersion(*v),
        TransportError::IntegrityFailure => TransportError::IntegrityFailure,
        TransportError::EncryptionFailure => TransportError::EncryptionFailure,
        TransportError::InvalidOperation(m) => TransportError::InvalidOperation(m),
        TransportError::TruncatedRead { needed, drained } => TransportError::TruncatedRead {
            needed: *needed,
            drained: *drained,
        },
        TransportError::ConnectionClosed => TransportError::ConnectionClosed,
        TransportError::Cancelled => TransportError::Cancelled,
        TransportError::Timeout => TransportError::Timeout,
        TransportError::Config(m) => TransportError::Config(m.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duplex_pair() -> (
        SecureSession<tokio::io::DuplexStream>,
        SecureSession<tokio::io::DuplexStream>,
    ) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let peer = PeerVersions {
            latest: PROTOCOL_VERSION,
            oldest: PROTOCOL_COMPAT_FLOOR,
        };
        let key = [0x21u8; 32];
        let left = SecureSession::negotiate(a, peer, Some(key), SessionConfig::default()).unwrap();
        let right = SecureSession::negotiate(b, peer, Some(key), SessionConfig::default()).unwrap();
        (left, right)
    }

    #[tokio::test]
    async fn test_send_recv_encrypted_roundtrip() {
        let (mut left, mut right) = duplex_pair();
        assert_eq!(left.algorithm(), ContentAlgorithm::Aes256CbcHmacSha256);

        left.send_packet(9, b"over the wire").await.unwrap();
        let packet = right.recv_packet().await.unwrap();
        assert_eq!(packet.id, 9);
        assert_eq!(packet.content.as_ref(), b"over the wire");
    }

    #[tokio::test]
    async fn test_plaintext_version_passthrough() {
        let (a, b) = tokio::io::duplex(4096);
        let peer = PeerVersions {
            latest: 1,
            oldest: 1,
        };
        let mut left =
            SecureSession::negotiate(a, peer, None, SessionConfig::default()).unwrap();
        let mut right =
            SecureSession::negotiate(b, peer, None, SessionConfig::default()).unwrap();
        assert_eq!(left.algorithm(), ContentAlgorithm::None);

        left.send_packet(1, b"clear").await.unwrap();
        let packet = right.recv_packet().await.unwrap();
        assert_eq!(packet.content.as_ref(), b"clear");
    }

    #[tokio::test]
    async fn test_negotiation_failure_surfaces() {
        let (a, _b) = tokio::io::duplex(64);
        let peer = PeerVersions {
            latest: 0,
            oldest: 0,
        };
        let result =
            SecureSession::negotiate(a, peer, Some([0u8; 32]), SessionConfig::default());
        assert!(matches!(result, Err(TransportError::VersionMismatch)));
    }

    #[tokio::test]
    async fn test_missing_key_rejected() {
        let (a, _b) = tokio::io::duplex(64);
        let peer = PeerVersions {
            latest: PROTOCOL_VERSION,
            oldest: PROTOCOL_COMPAT_FLOOR,
        };
        let result = SecureSession::negotiate(a, peer, None, SessionConfig::default());
        assert!(matches!(result, Err(TransportError::Argument(_))));
    }

    #[tokio::test]
    async fn test_oversized_send_rejected() {
        let (mut left, _right) = duplex_pair();
        let oversized = vec![0u8; MAX_PACKET_SIZE + 1];
        assert!(matches!(
            left.send_packet(1, &oversized).await,
            Err(TransportError::OversizedPacket(_))
        ));
    }

    #[tokio::test]
    async fn test_peer_eof_maps_to_connection_closed() {
        let (mut left, right) = duplex_pair();
        drop(right);
        assert!(matches!(
            left.recv_packet().await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
