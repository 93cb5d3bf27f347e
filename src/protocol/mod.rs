//! # Protocol Layer
//!
//! Connection-level policy: deterministic version/algorithm negotiation and
//! the dispatcher that carries application callbacks off the I/O thread.

pub mod dispatch;
pub mod version;

pub use dispatch::{Callback, Completion, DispatchOptions, Dispatcher, PanicHandler};
pub use version::{
    algorithm_for_version, negotiate_application_version, negotiate_protocol_version,
    ContentAlgorithm, ProtocolVersion, PROTOCOL_COMPAT_FLOOR, PROTOCOL_VERSION,
};
