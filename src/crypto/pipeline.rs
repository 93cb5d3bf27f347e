//! # Streaming Crypto Pipeline
//!
//! The transform core shared by both engine variants: an ordered stage list
//! (digest, cipher) plus a small forward-only state machine
//! `{Uninitialized, Active, Finalized}`. Stages are pure transforms over
//! byte slices, composed lazily on the first update so key schedules are
//! only built for pipelines that actually move data.
//!
//! Ordering guarantees the digest always covers plaintext, never ciphertext:
//! encryption digests input before ciphering it, decryption digests the
//! deciphered output.
//!
//! ## IV handling
//! Encryption generates a fresh random 16-byte IV at construction and emits
//! it as the first output bytes. Decryption interprets the first 16 input
//! bytes as the IV; they never reach the digest or the plaintext output.
//! Either way the IV counts toward the byte-position accounting on the call
//! that produces or consumes it.
//!
//! ## Finalization
//! Exactly one `finalize` per pipeline: it flushes the padded final cipher
//! block and freezes the digest. A decrypt-side padding failure surfaces as
//! an integrity error and leaves the pipeline in a terminal state that is
//! still safe to dispose, with no second, masking error.

use zeroize::Zeroizing;

use crate::crypto::cipher::{CbcStage, IV_LEN};
use crate::crypto::digest::{derive_mac_key, ContentDigest, DIGEST_LEN};
use crate::error::{constants, Result, TransportError};
use crate::protocol::version::ContentAlgorithm;

/// Transform direction of a cipher pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoMode {
    Encrypt,
    Decrypt,
}

/// Forward-only lifecycle of a pipeline; no state is ever revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Active,
    Finalized,
}

#[derive(Clone, Copy)]
enum Variant {
    /// Pass bytes through unchanged, digesting them.
    DigestOnly,
    /// AES-256-CBC composed with the running plaintext digest.
    CipherDigest { mode: CryptoMode, keyed: bool },
}

/// Incremental encrypt/decrypt transform with a running plaintext digest.
///
/// Not thread-safe; exactly one instance drives one direction of one
/// payload stream.
pub struct CryptoPipeline {
    variant: Variant,
    state: PipelineState,
    key: Option<Zeroizing<[u8; 32]>>,
    /// Encrypt: generated at construction. Decrypt: learned from the stream.
    iv: Option<[u8; IV_LEN]>,
    /// Decrypt only: partially accumulated IV bytes.
    iv_buf: Vec<u8>,
    /// Encrypt only: IV already emitted to the output.
    iv_delivered: bool,
    digest: Option<ContentDigest>,
    cipher: Option<CbcStage>,
    position: u64,
    digest_value: Option<[u8; DIGEST_LEN]>,
    disposed: bool,
}

impl CryptoPipeline {
    /// Digest-only variant: bytes pass through unchanged while a plain
    /// SHA-256 accumulates over them.
    pub fn digest_only() -> Self {
        Self::build(Variant::DigestOnly, None, None)
    }

    /// Cipher+digest encryptor. Generates the stream IV immediately.
    ///
    /// # Errors
    /// `TransportError::EncryptionFailure` if the system entropy source
    /// fails.
    pub fn encryptor(key: &[u8; 32], keyed_digest: bool) -> Result<Self> {
        let mut iv = [0u8; IV_LEN];
        getrandom::fill(&mut iv).map_err(|_| TransportError::EncryptionFailure)?;
        Ok(Self::build(
            Variant::CipherDigest {
                mode: CryptoMode::Encrypt,
                keyed: keyed_digest,
            },
            Some(key),
            Some(iv),
        ))
    }

    /// Cipher+digest decryptor. The IV is read from the first 16 input
    /// bytes.
    pub fn decryptor(key: &[u8; 32], keyed_digest: bool) -> Self {
        Self::build(
            Variant::CipherDigest {
                mode: CryptoMode::Decrypt,
                keyed: keyed_digest,
            },
            Some(key),
            None,
        )
    }

    /// Pipeline for a negotiated content algorithm, or `None` when the
    /// algorithm is [`ContentAlgorithm::None`].
    ///
    /// # Errors
    /// `TransportError::Argument` if the algorithm requires a key and none
    /// was supplied.
    pub fn for_algorithm(
        algorithm: ContentAlgorithm,
        mode: CryptoMode,
        key: Option<&[u8; 32]>,
    ) -> Result<Option<Self>> {
        let keyed = match algorithm {
            ContentAlgorithm::None => return Ok(None),
            ContentAlgorithm::Aes256CbcSha256 => false,
            ContentAlgorithm::Aes256CbcHmacSha256 => true,
        };
        let key = key.ok_or(TransportError::Argument(constants::ERR_KEY_REQUIRED))?;
        let pipeline = match mode {
            CryptoMode::Encrypt => Self::encryptor(key, keyed)?,
            CryptoMode::Decrypt => Self::decryptor(key, keyed),
        };
        Ok(Some(pipeline))
    }

    fn build(variant: Variant, key: Option<&[u8; 32]>, iv: Option<[u8; IV_LEN]>) -> Self {
        Self {
            variant,
            state: PipelineState::Uninitialized,
            key: key.map(|k| Zeroizing::new(*k)),
            iv,
            iv_buf: Vec::new(),
            iv_delivered: false,
            digest: None,
            cipher: None,
            position: 0,
            digest_value: None,
            disposed: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Logical byte position: every plaintext-equivalent byte through the
    /// public entry points, the 16 IV bytes included on the call that
    /// produced or consumed them.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Stream IV, once known.
    pub fn iv(&self) -> Option<[u8; IV_LEN]> {
        self.iv
    }

    /// The frozen digest value.
    ///
    /// # Errors
    /// `TransportError::InvalidOperation` before finalization, or after a
    /// finalization that failed integrity validation.
    pub fn digest(&self) -> Result<[u8; DIGEST_LEN]> {
        if self.state != PipelineState::Finalized {
            return Err(TransportError::InvalidOperation(
                constants::ERR_NOT_FINALIZED,
            ));
        }
        self.digest_value.ok_or(TransportError::InvalidOperation(
            constants::ERR_DIGEST_UNAVAILABLE,
        ))
    }

    /// Construct the stage list exactly once, on first use.
    fn ensure_initialized(&mut self) -> Result<()> {
        match self.state {
            PipelineState::Finalized => {
                return Err(TransportError::InvalidOperation(
                    constants::ERR_ALREADY_FINALIZED,
                ))
            }
            PipelineState::Active => return Ok(()),
            PipelineState::Uninitialized => {}
        }

        match self.variant {
            Variant::DigestOnly => {
                self.digest = Some(ContentDigest::plain());
            }
            Variant::CipherDigest {
                mode: CryptoMode::Encrypt,
                ..
            } => {
                let iv = self.iv.expect("encrypt pipelines generate the IV upfront");
                self.build_stages(&iv)?;
            }
            // Decrypt stages wait for the IV to arrive off the stream.
            Variant::CipherDigest {
                mode: CryptoMode::Decrypt,
                ..
            } => {}
        }
        self.state = PipelineState::Active;
        Ok(())
    }

    fn build_stages(&mut self, iv: &[u8; IV_LEN]) -> Result<()> {
        let Variant::CipherDigest { mode, keyed } = self.variant else {
            unreachable!("stages are only built for cipher pipelines")
        };
        let key = self
            .key
            .as_ref()
            .ok_or(TransportError::Argument(constants::ERR_KEY_REQUIRED))?;

        self.digest = Some(if keyed {
            ContentDigest::keyed(&derive_mac_key(key, iv))?
        } else {
            ContentDigest::plain()
        });
        self.cipher = Some(match mode {
            CryptoMode::Encrypt => CbcStage::encryptor(key, iv)?,
            CryptoMode::Decrypt => CbcStage::decryptor(key, iv)?,
        });
        Ok(())
    }

    /// Push bytes through the stage list, appending transformed output to
    /// `out`.
    ///
    /// # Errors
    /// `TransportError::InvalidOperation` once finalized.
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.ensure_initialized()?;

        match self.variant {
            Variant::DigestOnly => {
                self.digest
                    .as_mut()
                    .expect("active pipeline has a digest")
                    .update(input);
                out.extend_from_slice(input);
                self.position += input.len() as u64;
            }
            Variant::CipherDigest {
                mode: CryptoMode::Encrypt,
                ..
            } => {
                if !self.iv_delivered {
                    out.extend_from_slice(&self.iv.expect("encrypt IV set at construction"));
                    self.iv_delivered = true;
                    self.position += IV_LEN as u64;
                }
                self.digest
                    .as_mut()
                    .expect("active pipeline has a digest")
                    .update(input);
                self.cipher
                    .as_mut()
                    .expect("active pipeline has a cipher")
                    .update(input, out);
                self.position += input.len() as u64;
            }
            Variant::CipherDigest {
                mode: CryptoMode::Decrypt,
                ..
            } => {
                let mut input = input;
                if self.cipher.is_none() {
                    let take = (IV_LEN - self.iv_buf.len()).min(input.len());
                    self.iv_buf.extend_from_slice(&input[..take]);
                    input = &input[take..];
                    if self.iv_buf.len() == IV_LEN {
                        let mut iv = [0u8; IV_LEN];
                        iv.copy_from_slice(&self.iv_buf);
                        self.build_stages(&iv)?;
                        self.iv = Some(iv);
                        self.iv_buf.clear();
                        self.position += IV_LEN as u64;
                    }
                }
                if let Some(cipher) = self.cipher.as_mut() {
                    if !input.is_empty() {
                        let start = out.len();
                        cipher.update(input, out);
                        self.digest
                            .as_mut()
                            .expect("active pipeline has a digest")
                            .update(&out[start..]);
                        self.position += (out.len() - start) as u64;
                    }
                }
            }
        }
        Ok(())
    }

    /// Flush the final cipher block and freeze the digest. Permitted exactly
    /// once per pipeline.
    ///
    /// # Errors
    /// - `TransportError::InvalidOperation` on a second call.
    /// - `TransportError::IntegrityFailure` when decrypt-side padding/format
    ///   validation fails; the pipeline stays safely disposable and the
    ///   digest remains unavailable.
    pub fn finalize(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.state == PipelineState::Finalized {
            return Err(TransportError::InvalidOperation(
                constants::ERR_ALREADY_FINALIZED,
            ));
        }
        self.ensure_initialized()?;
        // Terminal from here on, even if validation fails below.
        self.state = PipelineState::Finalized;

        match self.variant {
            Variant::DigestOnly => {
                let digest = self.digest.take().expect("active pipeline has a digest");
                self.digest_value = Some(digest.finalize());
                Ok(())
            }
            Variant::CipherDigest {
                mode: CryptoMode::Encrypt,
                ..
            } => {
                if !self.iv_delivered {
                    out.extend_from_slice(&self.iv.expect("encrypt IV set at construction"));
                    self.iv_delivered = true;
                    self.position += IV_LEN as u64;
                }
                self.cipher
                    .as_mut()
                    .expect("active pipeline has a cipher")
                    .finish(out)?;
                let digest = self.digest.take().expect("active pipeline has a digest");
                self.digest_value = Some(digest.finalize());
                Ok(())
            }
            Variant::CipherDigest {
                mode: CryptoMode::Decrypt,
                ..
            } => {
                // A stream shorter than one IV never carried a valid payload.
                let Some(cipher) = self.cipher.as_mut() else {
                    return Err(TransportError::IntegrityFailure);
                };
                let start = out.len();
                cipher.finish(out)?;
                let digest = self.digest.as_mut().expect("active pipeline has a digest");
                digest.update(&out[start..]);
                self.position += (out.len() - start) as u64;
                let digest = self.digest.take().expect("digest checked above");
                self.digest_value = Some(digest.finalize());
                Ok(())
            }
        }
    }

    /// Release cipher and digest state. Idempotent: repeated disposal is a
    /// no-op, not an error. Key material is zeroized.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.cipher = None;
        self.digest = None;
        self.key = None;
        self.iv = None;
        self.iv_buf.clear();
    }
}

impl Drop for CryptoPipeline {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x5A; 32];

    fn run_all(pipeline: &mut CryptoPipeline, input: &[u8], chunk: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for part in input.chunks(chunk.max(1)) {
            pipeline.update(part, &mut out)?;
        }
        pipeline.finalize(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_digest_only_passes_through() {
        let mut pipeline = CryptoPipeline::digest_only();
        let out = run_all(&mut pipeline, b"pass through unchanged", 5).unwrap();
        assert_eq!(out, b"pass through unchanged");
        assert_eq!(pipeline.position(), 22);
        assert!(pipeline.digest().is_ok());
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip_digests_agree() {
        for keyed in [false, true] {
            let plaintext = b"round trip through both pipelines".to_vec();

            let mut enc = CryptoPipeline::encryptor(&KEY, keyed).unwrap();
            let ciphertext = run_all(&mut enc, &plaintext, 7).unwrap();
            assert!(ciphertext.len() >= IV_LEN + plaintext.len());

            let mut dec = CryptoPipeline::decryptor(&KEY, keyed);
            let decrypted = run_all(&mut dec, &ciphertext, 3).unwrap();
            assert_eq!(decrypted, plaintext);
            assert_eq!(enc.digest().unwrap(), dec.digest().unwrap());
        }
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let mut enc = CryptoPipeline::encryptor(&KEY, false).unwrap();
        let ciphertext = run_all(&mut enc, b"", 1).unwrap();
        // IV plus one full padding block.
        assert_eq!(ciphertext.len(), IV_LEN + 16);

        let mut dec = CryptoPipeline::decryptor(&KEY, false);
        let decrypted = run_all(&mut dec, &ciphertext, 1).unwrap();
        assert!(decrypted.is_empty());
        assert_eq!(enc.digest().unwrap(), dec.digest().unwrap());
    }

    #[test]
    fn test_iv_counts_toward_position() {
        let mut enc = CryptoPipeline::encryptor(&KEY, false).unwrap();
        let mut out = Vec::new();
        enc.update(b"abcd", &mut out).unwrap();
        assert_eq!(enc.position(), IV_LEN as u64 + 4);

        let mut dec = CryptoPipeline::decryptor(&KEY, false);
        let mut plain = Vec::new();
        // Feed only part of the IV: position must not advance yet.
        dec.update(&out[..10], &mut plain).unwrap();
        assert_eq!(dec.position(), 0);
        dec.update(&out[10..IV_LEN], &mut plain).unwrap();
        assert_eq!(dec.position(), IV_LEN as u64);
    }

    #[test]
    fn test_double_finalize_rejected() {
        let mut pipeline = CryptoPipeline::digest_only();
        let mut out = Vec::new();
        pipeline.update(b"data", &mut out).unwrap();
        pipeline.finalize(&mut out).unwrap();
        assert!(matches!(
            pipeline.finalize(&mut out),
            Err(TransportError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_update_after_finalize_rejected() {
        let mut pipeline = CryptoPipeline::encryptor(&KEY, false).unwrap();
        let mut out = Vec::new();
        pipeline.finalize(&mut out).unwrap();
        assert!(matches!(
            pipeline.update(b"late", &mut out),
            Err(TransportError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_digest_before_finalize_rejected() {
        let mut pipeline = CryptoPipeline::digest_only();
        let mut out = Vec::new();
        pipeline.update(b"data", &mut out).unwrap();
        assert!(matches!(
            pipeline.digest(),
            Err(TransportError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_truncated_ciphertext_fails_integrity() {
        let mut enc = CryptoPipeline::encryptor(&KEY, false).unwrap();
        let ciphertext = run_all(&mut enc, b"some content here", 64).unwrap();

        // Drop the final block: the stream is no longer block-terminated.
        let mut dec = CryptoPipeline::decryptor(&KEY, false);
        let mut out = Vec::new();
        dec.update(&ciphertext[..ciphertext.len() - 16], &mut out)
            .unwrap();
        assert!(matches!(
            dec.finalize(&mut out),
            Err(TransportError::IntegrityFailure)
        ));

        // Terminal state: no second masking error, digest unavailable,
        // disposal is a no-op.
        assert_eq!(dec.state(), PipelineState::Finalized);
        assert!(matches!(
            dec.digest(),
            Err(TransportError::InvalidOperation(_))
        ));
        dec.dispose();
        dec.dispose();
    }

    #[test]
    fn test_stream_shorter_than_iv_fails_integrity() {
        let mut dec = CryptoPipeline::decryptor(&KEY, false);
        let mut out = Vec::new();
        dec.update(&[0u8; 5], &mut out).unwrap();
        assert!(matches!(
            dec.finalize(&mut out),
            Err(TransportError::IntegrityFailure)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_detected() {
        let plaintext = vec![0xC3u8; 64];
        let mut enc = CryptoPipeline::encryptor(&KEY, true).unwrap();
        let ciphertext = run_all(&mut enc, &plaintext, 64).unwrap();
        let sender_digest = enc.digest().unwrap();

        // Flip one bit in the first content block (beyond the IV). Either
        // padding validation fails at finalize, or the recovered plaintext
        // block is scrambled and the frozen digests disagree.
        let mut tampered = ciphertext.clone();
        tampered[IV_LEN] ^= 0x80;

        let mut dec = CryptoPipeline::decryptor(&KEY, true);
        match run_all(&mut dec, &tampered, 64) {
            Err(TransportError::IntegrityFailure) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(recovered) => {
                assert_ne!(recovered, plaintext);
                assert_ne!(dec.digest().unwrap(), sender_digest);
            }
        }
    }

    #[test]
    fn test_for_algorithm_selection() {
        assert!(CryptoPipeline::for_algorithm(
            ContentAlgorithm::None,
            CryptoMode::Encrypt,
            None
        )
        .unwrap()
        .is_none());

        assert!(matches!(
            CryptoPipeline::for_algorithm(
                ContentAlgorithm::Aes256CbcSha256,
                CryptoMode::Encrypt,
                None
            ),
            Err(TransportError::Argument(_))
        ));

        assert!(CryptoPipeline::for_algorithm(
            ContentAlgorithm::Aes256CbcHmacSha256,
            CryptoMode::Decrypt,
            Some(&KEY)
        )
        .unwrap()
        .is_some());
    }
}
