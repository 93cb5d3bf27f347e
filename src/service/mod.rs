//! # Service Layer
//!
//! The session abstraction applications interact with: negotiated,
//! encrypted, dispatcher-notified packet exchange over a connected stream.

pub mod handler;
pub mod session;

pub use handler::{CloseReason, SessionHandler};
pub use session::{PeerVersions, SecureSession};
