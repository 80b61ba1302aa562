//! Encrypted frames: the sink wrapper used for file bodies and the
//! directory block.
//!
//! A frame is self-describing so readers can consume it without knowing the
//! ciphertext extent up front:
//!
//! - `[u32 magic "GDEC"]`
//! - `[u8 iv[16]]`
//! - `[u8 md5[16]]` — digest of the plaintext
//! - `[u64 length]` — plaintext length
//! - `[ciphertext]` — AES-256-CFB over the plaintext, zero-padded to a
//!   16-byte multiple before encryption
//!
//! [`EncryptedWriter`] wraps any sink, buffers plaintext, and emits one frame
//! on [`EncryptedWriter::finish`]. Construction is fallible: a key that is
//! not exactly 32 bytes is rejected before any bytes are written.

use aes::Aes256;
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use md5::{Digest, Md5};
use rand::RngCore;
use std::io::{Read, Write};

use crate::error::{PckError, Result};
use crate::format::pad;

/// Encrypted frame magic, "GDEC" in little-endian byte order.
pub const ENCRYPTED_BLOCK_MAGIC: u32 = 0x4345_4447;

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

/// Compute the MD5 digest of a buffer.
pub fn md5_digest(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// A buffering sink that emits one encrypted frame into the wrapped writer.
#[derive(Debug)]
pub struct EncryptedWriter<W: Write> {
    inner: W,
    key: [u8; 32],
    iv: [u8; 16],
    buf: Vec<u8>,
}

impl<W: Write> EncryptedWriter<W> {
    /// Wrap `inner` with a fresh random IV.
    pub fn new(inner: W, key: &[u8]) -> Result<Self> {
        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut iv);
        Self::with_iv(inner, key, iv)
    }

    /// Wrap `inner` with an explicit IV. Deterministic output for tests.
    pub fn with_iv(inner: W, key: &[u8], iv: [u8; 16]) -> Result<Self> {
        let key: [u8; 32] = key
            .try_into()
            .map_err(|_| PckError::InvalidKeyLength(key.len()))?;
        Ok(Self {
            inner,
            key,
            iv,
            buf: Vec::new(),
        })
    }

    /// Encrypt the buffered plaintext and write the frame, returning the
    /// wrapped sink.
    pub fn finish(mut self) -> Result<W> {
        let digest = md5_digest(&self.buf);
        let length = self.buf.len() as u64;

        self.buf
            .resize(self.buf.len() + pad(16, length) as usize, 0);
        let enc = Aes256CfbEnc::new(&self.key.into(), &self.iv.into());
        enc.encrypt(&mut self.buf);

        self.inner.write_u32::<LE>(ENCRYPTED_BLOCK_MAGIC)?;
        self.inner.write_all(&self.iv)?;
        self.inner.write_all(&digest)?;
        self.inner.write_u64::<LE>(length)?;
        self.inner.write_all(&self.buf)?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for EncryptedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Read and decrypt one frame from `source`, verifying the stored digest.
pub fn read_frame<R: Read>(source: &mut R, key: &[u8]) -> Result<Vec<u8>> {
    let key: [u8; 32] = key
        .try_into()
        .map_err(|_| PckError::InvalidKeyLength(key.len()))?;

    let magic = source.read_u32::<LE>()?;
    if magic != ENCRYPTED_BLOCK_MAGIC {
        return Err(PckError::Corrupt(format!(
            "bad encrypted block magic: {magic:#010x}"
        )));
    }

    let mut iv = [0u8; 16];
    source.read_exact(&mut iv)?;
    let mut digest = [0u8; 16];
    source.read_exact(&mut digest)?;
    let length = source.read_u64::<LE>()?;

    let padded = length + pad(16, length);
    let mut data = vec![0u8; padded as usize];
    source.read_exact(&mut data)?;

    let dec = Aes256CfbDec::new(&key.into(), &iv.into());
    dec.decrypt(&mut data);
    data.truncate(length as usize);

    if md5_digest(&data) != digest {
        return Err(PckError::DigestMismatch);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn frame_round_trip() {
        let plain = b"the quick brown fox jumps over the lazy dog";
        let mut writer = EncryptedWriter::with_iv(Vec::new(), &KEY, [1u8; 16]).unwrap();
        writer.write_all(plain).unwrap();
        let out = writer.finish().unwrap();

        // header + ciphertext padded to 16
        assert_eq!(out.len(), 4 + 16 + 16 + 8 + 48);

        let back = read_frame(&mut Cursor::new(&out), &KEY).unwrap();
        assert_eq!(back, plain);
    }

    #[test]
    fn empty_frame_round_trip() {
        let writer = EncryptedWriter::with_iv(Vec::new(), &KEY, [0u8; 16]).unwrap();
        let out = writer.finish().unwrap();
        let back = read_frame(&mut Cursor::new(&out), &KEY).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn wrong_key_is_detected() {
        let mut writer = EncryptedWriter::with_iv(Vec::new(), &KEY, [2u8; 16]).unwrap();
        writer.write_all(b"secret").unwrap();
        let out = writer.finish().unwrap();

        let wrong = [8u8; 32];
        match read_frame(&mut Cursor::new(&out), &wrong) {
            Err(PckError::DigestMismatch) => {}
            other => panic!("expected digest mismatch, got {other:?}"),
        }
    }

    #[test]
    fn short_key_is_rejected() {
        match EncryptedWriter::with_iv(Vec::new(), &[0u8; 16], [0u8; 16]) {
            Err(PckError::InvalidKeyLength(16)) => {}
            other => panic!("expected key length error, got {other:?}"),
        }
    }
}
