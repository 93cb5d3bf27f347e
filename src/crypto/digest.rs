//! Running plaintext digest stage.
//!
//! Both pipeline variants feed every plaintext byte through one of these
//! accumulators: a plain SHA-256 (tamper-evidence against corruption) or a
//! keyed HMAC-SHA-256 whose key is derived from the content key, the stream
//! IV, and a fixed context label. The digest value is frozen at pipeline
//! finalization and carried out-of-band by whichever higher-level protocol
//! attaches it.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{constants, Result, TransportError};

type HmacSha256 = Hmac<Sha256>;

/// Digest output width in bytes.
pub const DIGEST_LEN: usize = 32;

/// Context label for MAC key derivation.
const MAC_KEY_CONTEXT: &[u8] = b"secure-transport content mac v1";

/// Derive the HMAC key for a keyed content digest.
///
/// Three inputs bind the MAC to this stream: the fixed context label, the
/// 32-byte content key, and the 16-byte IV. Both directions of a stream
/// derive the same key, so encrypt- and decrypt-side digests over the same
/// plaintext agree.
pub fn derive_mac_key(key: &[u8; 32], iv: &[u8; 16]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(MAC_KEY_CONTEXT);
    hasher.update(key);
    hasher.update(iv);
    hasher.finalize().into()
}

/// Incremental digest accumulator over plaintext bytes.
pub enum ContentDigest {
    /// Unkeyed SHA-256.
    Plain(Sha256),
    /// HMAC-SHA-256 keyed per [`derive_mac_key`].
    Keyed(HmacSha256),
}

impl ContentDigest {
    /// Plain SHA-256 accumulator.
    pub fn plain() -> Self {
        ContentDigest::Plain(Sha256::new())
    }

    /// Keyed accumulator for the given MAC key.
    pub fn keyed(mac_key: &[u8; 32]) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(mac_key)
            .map_err(|_| TransportError::Argument(constants::ERR_KEY_LENGTH))?;
        Ok(ContentDigest::Keyed(mac))
    }

    /// Feed plaintext bytes into the accumulator.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            ContentDigest::Plain(hasher) => hasher.update(data),
            ContentDigest::Keyed(mac) => mac.update(data),
        }
    }

    /// Freeze and return the digest value.
    pub fn finalize(self) -> [u8; DIGEST_LEN] {
        match self {
            ContentDigest::Plain(hasher) => hasher.finalize().into(),
            ContentDigest::Keyed(mac) => mac.finalize().into_bytes().into(),
        }
    }
}
