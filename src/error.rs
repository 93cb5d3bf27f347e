//! # Error Types
//!
//! Comprehensive error handling for the secure transport core.
//!
//! This module defines all error variants that can occur during transport
//! operations, from low-level I/O errors to protocol violations and
//! cryptographic integrity failures.
//!
//! ## Error Categories
//! - **I/O Errors**: Network and stream failures
//! - **Protocol Violations**: Malformed headers, oversized frames, failed
//!   version negotiation; always connection-fatal
//! - **Cryptographic Errors**: Decrypt-side padding/format validation failures
//! - **Contract Violations**: Out-of-range arguments and invalid operation
//!   sequences (double finalize, use after finalize); surfaced immediately,
//!   never retried
//!
//! All errors implement `std::error::Error` for interoperability.

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
/// Static strings are borrowed, avoiding heap allocations for common error cases.
pub mod constants {
    /// Codec and buffer contract violations
    pub const ERR_UINT24_RANGE: &str = "value exceeds 24-bit range";
    pub const ERR_KEY_LENGTH: &str = "content key must be 32 bytes";
    pub const ERR_IV_LENGTH: &str = "initialization vector must be 16 bytes";

    /// Crypto pipeline state machine violations
    pub const ERR_ALREADY_FINALIZED: &str = "pipeline already finalized";
    pub const ERR_NOT_FINALIZED: &str = "digest unavailable before finalization";
    pub const ERR_DIGEST_UNAVAILABLE: &str = "digest unavailable after failed finalization";
    pub const ERR_KEY_REQUIRED: &str = "negotiated algorithm requires a content key";

    /// Dispatcher contract violations
    pub const ERR_REENTRANT_INVOKE: &str = "invoke called from a callback on the same dispatcher";
    pub const ERR_DISPATCHER_STOPPED: &str = "dispatcher is shut down";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_CONNECTION_TIMEOUT: &str = "Connection timed out (no activity)";
    pub const ERR_TIMEOUT: &str = "Operation timed out";

    /// Protocol negotiation errors
    pub const ERR_NO_SHARED_VERSION: &str = "No mutually supported protocol version";
    pub const ERR_UNSUPPORTED_VERSION: &str = "Unsupported protocol version";

    /// Integrity errors
    pub const ERR_INTEGRITY: &str = "Content integrity check failed";
    pub const ERR_TRUNCATED_READ: &str = "Reassembly buffer drained short of requested length";
}

// TransportError is the primary error type for all transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid argument: {0}")]
    Argument(&'static str),

    #[error("invalid packet header")]
    InvalidHeader,

    #[error("packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("no mutually supported protocol version")]
    VersionMismatch,

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    #[error("content integrity check failed")]
    IntegrityFailure,

    #[error("encryption failed")]
    EncryptionFailure,

    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// The lossy-failure result of an exact-length dequeue: the buffer ran
    /// dry mid-read and the bytes already pulled are not restored. Fatal for
    /// the in-flight read.
    #[error("truncated read: needed {needed} bytes, drained {drained}")]
    TruncatedRead { needed: usize, drained: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out")]
    Timeout,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Type alias for Results using TransportError
pub type Result<T> = std::result::Result<T, TransportError>;
