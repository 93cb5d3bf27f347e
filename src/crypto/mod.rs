//! # Streaming Content Crypto
//!
//! Incremental encryption and integrity for packet and stream payloads.
//! The pipeline composes an AES-256-CBC stage with a running plaintext
//! digest (plain SHA-256 or keyed HMAC-SHA-256) so large payloads are
//! transformed as they stream, never buffered whole.
//!
//! ## Components
//! - **Pipeline**: the stage list plus the `{Uninitialized, Active,
//!   Finalized}` state machine
//! - **Cipher**: block-incremental CBC with PKCS#7 finalization
//! - **Digest**: the plaintext accumulator variants
//! - **Stream**: `Read`/`Write` wrappers fixing an instance to one direction
//!
//! ## Security
//! - Fresh random IV per encrypting pipeline (getrandom)
//! - Key material zeroized on disposal (zeroize crate)
//! - Decrypt-side padding failures surface as integrity errors, never as
//!   silently wrong plaintext

pub mod cipher;
pub mod digest;
pub mod pipeline;
pub mod stream;

pub use cipher::{BLOCK_LEN, IV_LEN};
pub use digest::DIGEST_LEN;
pub use pipeline::{CryptoMode, CryptoPipeline, PipelineState};
pub use stream::{CryptoReader, CryptoWriter};
