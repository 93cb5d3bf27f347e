//! # Stream Engine Wrappers
//!
//! Bind a [`CryptoPipeline`] to one direction of an underlying byte stream.
//! [`CryptoReader`] is the pull side: callers read transformed bytes out of
//! an inner `Read` source. [`CryptoWriter`] is the push side: callers write
//! bytes in and the transformed output lands on an inner `Write` sink.
//!
//! Direction is fixed by the wrapper type and mode by the pipeline, giving
//! the four combinations of the transform matrix (encrypt/decrypt ×
//! read/write). Driving a reader as a writer is impossible by construction.
//!
//! A reader finalizes its pipeline automatically when the inner source
//! reaches EOF; a writer finalizes explicitly via
//! [`CryptoWriter::finalize`], which flushes the padded final block to the
//! sink. Either way the frozen digest is available afterwards.

use std::io::{self, Read, Write};

use crate::crypto::digest::DIGEST_LEN;
use crate::crypto::pipeline::CryptoPipeline;
use crate::error::Result;

const CHUNK_LEN: usize = 8 * 1024;

fn to_io(err: crate::error::TransportError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// Pull-side engine: reads from `inner`, serves transformed bytes.
pub struct CryptoReader<R: Read> {
    inner: R,
    pipeline: CryptoPipeline,
    buffer: Vec<u8>,
    offset: usize,
    finished: bool,
}

impl<R: Read> CryptoReader<R> {
    /// Wrap `inner` with the given pipeline.
    pub fn new(inner: R, pipeline: CryptoPipeline) -> Self {
        Self {
            inner,
            pipeline,
            buffer: Vec::with_capacity(CHUNK_LEN),
            offset: 0,
            finished: false,
        }
    }

    /// The frozen digest; available once the stream was drained to EOF.
    pub fn digest(&self) -> Result<[u8; DIGEST_LEN]> {
        self.pipeline.digest()
    }

    /// Logical byte position of the pipeline.
    pub fn position(&self) -> u64 {
        self.pipeline.position()
    }

    /// Unwrap the inner source, dropping any untransformed buffered output.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CryptoReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.offset == self.buffer.len() && !self.finished {
            self.buffer.clear();
            self.offset = 0;
            let mut chunk = [0u8; CHUNK_LEN];
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                self.pipeline.finalize(&mut self.buffer).map_err(to_io)?;
                self.finished = true;
            } else {
                self.pipeline
                    .update(&chunk[..n], &mut self.buffer)
                    .map_err(to_io)?;
            }
        }

        let available = self.buffer.len() - self.offset;
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

/// Push-side engine: accepts bytes, writes transformed output to `inner`.
pub struct CryptoWriter<W: Write> {
    inner: W,
    pipeline: CryptoPipeline,
    scratch: Vec<u8>,
}

impl<W: Write> CryptoWriter<W> {
    /// Wrap `inner` with the given pipeline.
    pub fn new(inner: W, pipeline: CryptoPipeline) -> Self {
        Self {
            inner,
            pipeline,
            scratch: Vec::with_capacity(CHUNK_LEN),
        }
    }

    /// Flush the padded final block to the sink and freeze the digest.
    /// Permitted exactly once; writes after this fail.
    pub fn finalize(&mut self) -> Result<()> {
        self.scratch.clear();
        self.pipeline.finalize(&mut self.scratch)?;
        self.inner.write_all(&self.scratch)?;
        self.inner.flush()?;
        Ok(())
    }

    /// The frozen digest; available once [`finalize`](Self::finalize) ran.
    pub fn digest(&self) -> Result<[u8; DIGEST_LEN]> {
        self.pipeline.digest()
    }

    /// Logical byte position of the pipeline.
    pub fn position(&self) -> u64 {
        self.pipeline.position()
    }

    /// Unwrap the inner sink.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CryptoWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.pipeline.update(buf, &mut self.scratch).map_err(to_io)?;
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::pipeline::CryptoPipeline;
    use std::io::Cursor;

    const KEY: [u8; 32] = [0x33; 32];

    #[test]
    fn test_encrypt_read_decrypt_read_roundtrip() {
        let plaintext = vec![0xE1u8; 10_000];

        // encrypt, read direction: pull ciphertext out of a plaintext source
        let mut reader = CryptoReader::new(
            Cursor::new(plaintext.clone()),
            CryptoPipeline::encryptor(&KEY, false).unwrap(),
        );
        let mut ciphertext = Vec::new();
        reader.read_to_end(&mut ciphertext).unwrap();
        let encrypt_digest = reader.digest().unwrap();

        // decrypt, read direction: pull plaintext out of a ciphertext source
        let mut reader = CryptoReader::new(
            Cursor::new(ciphertext),
            CryptoPipeline::decryptor(&KEY, false),
        );
        let mut decrypted = Vec::new();
        reader.read_to_end(&mut decrypted).unwrap();

        assert_eq!(decrypted, plaintext);
        assert_eq!(reader.digest().unwrap(), encrypt_digest);
    }

    #[test]
    fn test_encrypt_write_decrypt_write_roundtrip() {
        let plaintext = b"write-direction payload, long enough to span blocks";

        // encrypt, write direction: push plaintext, ciphertext lands on sink
        let mut writer =
            CryptoWriter::new(Vec::new(), CryptoPipeline::encryptor(&KEY, true).unwrap());
        writer.write_all(plaintext).unwrap();
        writer.finalize().unwrap();
        let encrypt_digest = writer.digest().unwrap();
        let ciphertext = writer.into_inner();

        // decrypt, write direction: push ciphertext, plaintext lands on sink
        let mut writer = CryptoWriter::new(Vec::new(), CryptoPipeline::decryptor(&KEY, true));
        writer.write_all(&ciphertext).unwrap();
        writer.finalize().unwrap();

        assert_eq!(writer.digest().unwrap(), encrypt_digest);
        assert_eq!(writer.into_inner(), plaintext);
    }

    #[test]
    fn test_mixed_directions_interoperate() {
        let plaintext = vec![7u8; 4096];

        let mut writer =
            CryptoWriter::new(Vec::new(), CryptoPipeline::encryptor(&KEY, false).unwrap());
        writer.write_all(&plaintext).unwrap();
        writer.finalize().unwrap();
        let ciphertext = writer.into_inner();

        let mut reader = CryptoReader::new(
            Cursor::new(ciphertext),
            CryptoPipeline::decryptor(&KEY, false),
        );
        let mut decrypted = Vec::new();
        reader.read_to_end(&mut decrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_digest_only_stream_roundtrip() {
        let data = b"integrity without confidentiality";

        let mut writer = CryptoWriter::new(Vec::new(), CryptoPipeline::digest_only());
        writer.write_all(data).unwrap();
        writer.finalize().unwrap();
        let write_digest = writer.digest().unwrap();
        assert_eq!(writer.into_inner(), data);

        let mut reader = CryptoReader::new(Cursor::new(data.to_vec()), CryptoPipeline::digest_only());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(reader.digest().unwrap(), write_digest);
    }

    #[test]
    fn test_write_after_finalize_fails() {
        let mut writer =
            CryptoWriter::new(Vec::new(), CryptoPipeline::encryptor(&KEY, false).unwrap());
        writer.finalize().unwrap();
        assert!(writer.write_all(b"late").is_err());
    }

    #[test]
    fn test_truncated_stream_errors_on_read() {
        let mut writer =
            CryptoWriter::new(Vec::new(), CryptoPipeline::encryptor(&KEY, false).unwrap());
        writer.write_all(&[1u8; 100]).unwrap();
        writer.finalize().unwrap();
        let mut ciphertext = writer.into_inner();
        ciphertext.truncate(ciphertext.len() - 16);

        let mut reader = CryptoReader::new(
            Cursor::new(ciphertext),
            CryptoPipeline::decryptor(&KEY, false),
        );
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
