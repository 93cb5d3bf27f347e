#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Streaming crypto engine tests across the full transform matrix:
//! encrypt/decrypt in read and write direction, digest agreement, tampering
//! detection, and disposal semantics.

use std::io::{Cursor, Read, Write};

use secure_transport::crypto::pipeline::CryptoPipeline;
use secure_transport::crypto::{CryptoReader, CryptoWriter, IV_LEN};
use secure_transport::error::TransportError;

const KEY: [u8; 32] = [0xA7; 32];

fn sample_plaintext(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + 7) as u8).collect()
}

// ============================================================================
// FULL DIRECTION MATRIX
// ============================================================================

#[test]
fn roundtrip_all_direction_combinations() {
    for keyed in [false, true] {
        let plaintext = sample_plaintext(100_000);

        // encrypt via reader (pull), decrypt via writer (push)
        let mut enc_reader = CryptoReader::new(
            Cursor::new(plaintext.clone()),
            CryptoPipeline::encryptor(&KEY, keyed).unwrap(),
        );
        let mut ciphertext = Vec::new();
        enc_reader.read_to_end(&mut ciphertext).unwrap();
        let enc_digest = enc_reader.digest().unwrap();

        let mut dec_writer = CryptoWriter::new(Vec::new(), CryptoPipeline::decryptor(&KEY, keyed));
        // Push in uneven chunks to exercise partial-block buffering.
        for chunk in ciphertext.chunks(777) {
            dec_writer.write_all(chunk).unwrap();
        }
        dec_writer.finalize().unwrap();
        assert_eq!(dec_writer.digest().unwrap(), enc_digest);
        assert_eq!(dec_writer.into_inner(), plaintext);

        // encrypt via writer (push), decrypt via reader (pull)
        let mut enc_writer =
            CryptoWriter::new(Vec::new(), CryptoPipeline::encryptor(&KEY, keyed).unwrap());
        for chunk in plaintext.chunks(1234) {
            enc_writer.write_all(chunk).unwrap();
        }
        enc_writer.finalize().unwrap();
        let enc_digest = enc_writer.digest().unwrap();
        let ciphertext = enc_writer.into_inner();

        let mut dec_reader = CryptoReader::new(
            Cursor::new(ciphertext),
            CryptoPipeline::decryptor(&KEY, keyed),
        );
        let mut recovered = Vec::new();
        dec_reader.read_to_end(&mut recovered).unwrap();
        assert_eq!(recovered, plaintext);
        assert_eq!(dec_reader.digest().unwrap(), enc_digest);
    }
}

#[test]
fn digest_only_variant_matches_cipher_variant_digest() {
    // The plaintext digest must not depend on whether the stream also
    // encrypts (plain scheme only: the keyed scheme binds to the IV).
    let plaintext = sample_plaintext(5000);

    let mut digest_only = CryptoWriter::new(Vec::new(), CryptoPipeline::digest_only());
    digest_only.write_all(&plaintext).unwrap();
    digest_only.finalize().unwrap();

    let mut cipher = CryptoWriter::new(Vec::new(), CryptoPipeline::encryptor(&KEY, false).unwrap());
    cipher.write_all(&plaintext).unwrap();
    cipher.finalize().unwrap();

    assert_eq!(
        digest_only.digest().unwrap(),
        cipher.digest().unwrap(),
        "plain digest is computed over plaintext regardless of encryption"
    );
}

// ============================================================================
// POSITION ACCOUNTING
// ============================================================================

#[test]
fn position_counts_iv_and_plaintext() {
    let plaintext = sample_plaintext(1000);

    let mut writer = CryptoWriter::new(Vec::new(), CryptoPipeline::encryptor(&KEY, false).unwrap());
    writer.write_all(&plaintext).unwrap();
    writer.finalize().unwrap();
    assert_eq!(writer.position(), (IV_LEN + plaintext.len()) as u64);
    let ciphertext = writer.into_inner();

    let mut reader = CryptoReader::new(
        Cursor::new(ciphertext),
        CryptoPipeline::decryptor(&KEY, false),
    );
    let mut recovered = Vec::new();
    reader.read_to_end(&mut recovered).unwrap();
    assert_eq!(reader.position(), (IV_LEN + plaintext.len()) as u64);
}

#[test]
fn fresh_iv_per_stream() {
    let plaintext = sample_plaintext(64);
    let mut first = CryptoWriter::new(Vec::new(), CryptoPipeline::encryptor(&KEY, false).unwrap());
    let mut second = CryptoWriter::new(Vec::new(), CryptoPipeline::encryptor(&KEY, false).unwrap());
    first.write_all(&plaintext).unwrap();
    second.write_all(&plaintext).unwrap();
    first.finalize().unwrap();
    second.finalize().unwrap();

    let a = first.into_inner();
    let b = second.into_inner();
    assert_ne!(a[..IV_LEN], b[..IV_LEN], "IVs must differ per stream");
    assert_ne!(a[IV_LEN..], b[IV_LEN..], "same plaintext, distinct ciphertext");
}

// ============================================================================
// TAMPERING
// ============================================================================

#[test]
fn tampering_never_yields_clean_plaintext_and_digest() {
    let plaintext = sample_plaintext(256);
    let mut writer = CryptoWriter::new(Vec::new(), CryptoPipeline::encryptor(&KEY, true).unwrap());
    writer.write_all(&plaintext).unwrap();
    writer.finalize().unwrap();
    let sender_digest = writer.digest().unwrap();
    let ciphertext = writer.into_inner();

    // Flip one bit in every content byte position in turn (beyond the IV).
    for index in IV_LEN..ciphertext.len() {
        let mut tampered = ciphertext.clone();
        tampered[index] ^= 0x01;

        let mut pipeline = CryptoPipeline::decryptor(&KEY, true);
        let mut recovered = Vec::new();
        let outcome = pipeline
            .update(&tampered, &mut recovered)
            .and_then(|()| pipeline.finalize(&mut recovered));

        match outcome {
            Err(TransportError::IntegrityFailure) => {}
            Err(other) => panic!("unexpected error at byte {index}: {other:?}"),
            Ok(()) => {
                // Padding happened to validate: the plaintext is still
                // corrupted and the out-of-band digest exposes it.
                assert!(
                    recovered != plaintext || pipeline.digest().unwrap() != sender_digest,
                    "tampered byte {index} went undetected"
                );
            }
        }
    }
}

#[test]
fn truncation_fails_integrity() {
    let plaintext = sample_plaintext(64);
    let mut writer = CryptoWriter::new(Vec::new(), CryptoPipeline::encryptor(&KEY, false).unwrap());
    writer.write_all(&plaintext).unwrap();
    writer.finalize().unwrap();
    let ciphertext = writer.into_inner();

    for keep in [0usize, 5, IV_LEN, IV_LEN + 15, ciphertext.len() - 16] {
        let mut pipeline = CryptoPipeline::decryptor(&KEY, false);
        let mut recovered = Vec::new();
        let outcome = pipeline
            .update(&ciphertext[..keep], &mut recovered)
            .and_then(|()| pipeline.finalize(&mut recovered));
        assert!(
            matches!(outcome, Err(TransportError::IntegrityFailure)),
            "truncation to {keep} bytes must fail"
        );
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn double_finalize_and_late_writes_rejected() {
    let mut pipeline = CryptoPipeline::encryptor(&KEY, false).unwrap();
    let mut out = Vec::new();
    pipeline.update(b"once", &mut out).unwrap();
    pipeline.finalize(&mut out).unwrap();

    assert!(matches!(
        pipeline.finalize(&mut out),
        Err(TransportError::InvalidOperation(_))
    ));
    assert!(matches!(
        pipeline.update(b"late", &mut out),
        Err(TransportError::InvalidOperation(_))
    ));
}

#[test]
fn dispose_twice_is_a_no_op() {
    let mut active = CryptoPipeline::encryptor(&KEY, true).unwrap();
    let mut out = Vec::new();
    active.update(b"partial", &mut out).unwrap();
    active.dispose();
    active.dispose();

    let mut finalized = CryptoPipeline::digest_only();
    finalized.update(b"done", &mut out).unwrap();
    finalized.finalize(&mut out).unwrap();
    finalized.dispose();
    finalized.dispose();
}
