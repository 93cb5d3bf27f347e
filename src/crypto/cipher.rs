//! Incremental AES-256-CBC stage.
//!
//! Processes payload bytes block-by-block so that arbitrarily large streams
//! never need whole-buffer encryption. Encryption holds back the trailing
//! partial block until finalization pads it (PKCS#7); decryption additionally
//! withholds the last complete block, since only finalization may strip its
//! padding.

use aes::cipher::{generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;

use crate::error::{constants, Result, TransportError};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block width in bytes.
pub const BLOCK_LEN: usize = 16;

/// IV width in bytes (one cipher block).
pub const IV_LEN: usize = 16;

/// Direction-specific CBC transform with partial-block buffering.
pub enum CbcStage {
    Encrypt {
        cipher: Aes256CbcEnc,
        /// Plaintext not yet forming a complete block.
        pending: Vec<u8>,
    },
    Decrypt {
        cipher: Aes256CbcDec,
        /// Ciphertext held back: the trailing partial block plus the final
        /// complete block, which carries the padding.
        pending: Vec<u8>,
    },
}

impl CbcStage {
    /// CBC encryptor for the given key and IV.
    pub fn encryptor(key: &[u8; 32], iv: &[u8; IV_LEN]) -> Result<Self> {
        let cipher = Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|_| TransportError::Argument(constants::ERR_KEY_LENGTH))?;
        Ok(CbcStage::Encrypt {
            cipher,
            pending: Vec::with_capacity(BLOCK_LEN),
        })
    }

    /// CBC decryptor for the given key and IV.
    pub fn decryptor(key: &[u8; 32], iv: &[u8; IV_LEN]) -> Result<Self> {
        let cipher = Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| TransportError::Argument(constants::ERR_KEY_LENGTH))?;
        Ok(CbcStage::Decrypt {
            cipher,
            pending: Vec::with_capacity(2 * BLOCK_LEN),
        })
    }

    /// Transform as many buffered bytes as the mode permits, appending the
    /// output to `out`.
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        match self {
            CbcStage::Encrypt { cipher, pending } => {
                pending.extend_from_slice(input);
                let complete = pending.len() / BLOCK_LEN * BLOCK_LEN;
                for chunk in pending[..complete].chunks_exact(BLOCK_LEN) {
                    let mut block = GenericArray::clone_from_slice(chunk);
                    cipher.encrypt_block_mut(&mut block);
                    out.extend_from_slice(&block);
                }
                pending.drain(..complete);
            }
            CbcStage::Decrypt { cipher, pending } => {
                pending.extend_from_slice(input);
                // Never emit the last complete block before finalization.
                let complete = pending.len() / BLOCK_LEN * BLOCK_LEN;
                let emit = complete.saturating_sub(BLOCK_LEN);
                for chunk in pending[..emit].chunks_exact(BLOCK_LEN) {
                    let mut block = GenericArray::clone_from_slice(chunk);
                    cipher.decrypt_block_mut(&mut block);
                    out.extend_from_slice(&block);
                }
                pending.drain(..emit);
            }
        }
    }

    /// Flush the final block.
    ///
    /// Encryption pads the buffered partial block with PKCS#7 (a full padding
    /// block when the stream length is block-aligned) and emits its
    /// ciphertext. Decryption requires exactly one held-back block, strips
    /// its padding after validation, and emits the plaintext remainder.
    ///
    /// # Errors
    /// `TransportError::IntegrityFailure` on the decrypt side when the
    /// ciphertext is not block-aligned, is empty, or carries invalid padding.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            CbcStage::Encrypt { cipher, pending } => {
                let pad = (BLOCK_LEN - pending.len() % BLOCK_LEN) as u8;
                pending.resize(pending.len() + pad as usize, pad);
                debug_assert_eq!(pending.len(), BLOCK_LEN);
                let mut block = GenericArray::clone_from_slice(pending);
                cipher.encrypt_block_mut(&mut block);
                out.extend_from_slice(&block);
                pending.clear();
                Ok(())
            }
            CbcStage::Decrypt { cipher, pending } => {
                if pending.len() != BLOCK_LEN {
                    return Err(TransportError::IntegrityFailure);
                }
                let mut block = GenericArray::clone_from_slice(pending);
                cipher.decrypt_block_mut(&mut block);
                pending.clear();

                let pad = block[BLOCK_LEN - 1] as usize;
                if pad == 0 || pad > BLOCK_LEN {
                    return Err(TransportError::IntegrityFailure);
                }
                if block[BLOCK_LEN - pad..].iter().any(|&b| b != pad as u8) {
                    return Err(TransportError::IntegrityFailure);
                }
                out.extend_from_slice(&block[..BLOCK_LEN - pad]);
                Ok(())
            }
        }
    }
}
