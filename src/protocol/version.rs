//! # Version Negotiation
//!
//! Deterministic selection of a mutually supported protocol version and the
//! content-crypto algorithm bound to it. Runs once per connection, before
//! any packet is framed; the result is immutable for the connection's
//! lifetime, so no synchronization is needed to read it afterwards.
//!
//! Two independent ranges are negotiated with the same precedence rule: the
//! protocol version (framing/crypto policy) and an application-defined
//! version (payload/feature compatibility).

/// Numeric protocol version code.
pub type ProtocolVersion = u16;

/// Latest protocol version this build speaks.
pub const PROTOCOL_VERSION: ProtocolVersion = 3;

/// Oldest protocol version this build still accepts when downgrading.
pub const PROTOCOL_COMPAT_FLOOR: ProtocolVersion = 1;

/// Content-crypto algorithm applied to packet and stream payloads.
///
/// Fixed, versioned policy: the mapping from version to algorithm never
/// changes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentAlgorithm {
    /// Payloads travel as-is.
    None,
    /// AES-256-CBC with a running plain SHA-256 digest over plaintext.
    /// Tamper-evident against corruption, not a keyed authenticator.
    Aes256CbcSha256,
    /// AES-256-CBC with a keyed HMAC-SHA-256 digest over plaintext, the
    /// MAC key derived from content key, IV, and a fixed context label.
    Aes256CbcHmacSha256,
}

/// Version-to-algorithm policy table. Immutable configuration data, shared
/// across connections without synchronization.
const ALGORITHM_TABLE: &[(ProtocolVersion, ContentAlgorithm)] = &[
    (1, ContentAlgorithm::None),
    (2, ContentAlgorithm::Aes256CbcSha256),
    (3, ContentAlgorithm::Aes256CbcHmacSha256),
];

/// Select the protocol version both sides support.
///
/// Precedence, evaluated in order:
/// 1. the peer's latest equals our current version: pick it;
/// 2. the peer is newer but still supports our current version: pick ours
///    (the peer downgrades);
/// 3. the peer is older but not below our compatibility floor: pick the
///    peer's latest (we downgrade);
/// 4. no shared version.
pub fn negotiate_protocol_version(
    local: ProtocolVersion,
    local_floor: ProtocolVersion,
    peer_latest: ProtocolVersion,
    peer_oldest: ProtocolVersion,
) -> Option<ProtocolVersion> {
    if peer_latest == local {
        Some(local)
    } else if peer_latest > local && peer_oldest <= local {
        Some(local)
    } else if peer_latest < local && peer_latest >= local_floor {
        Some(peer_latest)
    } else {
        None
    }
}

/// Select an application version with the same three-case precedence,
/// applied symmetrically to an application-defined range.
pub fn negotiate_application_version(
    local_latest: ProtocolVersion,
    local_oldest: ProtocolVersion,
    peer_latest: ProtocolVersion,
    peer_oldest: ProtocolVersion,
) -> Option<ProtocolVersion> {
    if peer_latest == local_latest {
        Some(local_latest)
    } else if peer_latest > local_latest && peer_oldest <= local_latest {
        Some(local_latest)
    } else if peer_latest < local_latest && peer_latest >= local_oldest {
        Some(peer_latest)
    } else {
        None
    }
}

/// Look up the content algorithm bound to a negotiated version.
/// Versions with no table entry map to [`ContentAlgorithm::None`].
pub fn algorithm_for_version(version: ProtocolVersion) -> ContentAlgorithm {
    ALGORITHM_TABLE
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, algorithm)| *algorithm)
        .unwrap_or(ContentAlgorithm::None)
}
