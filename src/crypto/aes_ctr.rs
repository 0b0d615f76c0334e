//! AES-256-CTR encryption/decryption.
//!
//! CTR mode enables random-access decryption (any byte range without
//! processing preceding bytes), which is what lets the provider answer
//! `read(offset, length)` without materializing the plaintext.
//!
//! Uses Ctr32BE (big-endian 32-bit counter in the last four IV bytes).
//! The counter wraps without carrying into the 12-byte nonce, matching
//! `counter::iv_for_block`.
//!
//! SECURITY NOTE: AES-CTR does NOT provide authentication. Container
//! integrity is the caller's concern.

use std::io::{self, Read, Write};

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use zeroize::Zeroize;

use super::counter::iv_for_block;
use crate::error::CipherError;

/// AES-CTR IV size in bytes (128-bit counter block).
pub const AES_CTR_IV_SIZE: usize = 16;

/// AES-256 key size in bytes.
pub const AES_KEY_SIZE: usize = 32;

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

/// Largest chunk `CipherWriter` encrypts in one pass.
const WRITE_CHUNK: usize = 8 * 1024;

type Aes256Ctr32BE = ctr::Ctr32BE<Aes256>;

/// A keyed AES-256-CTR keystream positioned at a block boundary.
///
/// The transform is stateful: consecutive calls continue the keystream.
/// There is no mid-stream seek; build a new transform from
/// `iv_for_block` to start somewhere else.
pub struct CtrTransform {
    cipher: Aes256Ctr32BE,
}

impl CtrTransform {
    fn new(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        if key.len() != AES_KEY_SIZE {
            return Err(CipherError::InvalidKeyLength { len: key.len() });
        }
        if iv.len() != AES_CTR_IV_SIZE {
            return Err(CipherError::InvalidIvLength { len: iv.len() });
        }
        let cipher =
            Aes256Ctr32BE::new_from_slices(key, iv).map_err(|_| CipherError::Unsupported)?;
        Ok(Self { cipher })
    }

    /// Transform for encrypting plaintext that starts at the block implied by `iv`.
    pub fn new_encryptor(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        Self::new(key, iv)
    }

    /// Transform for decrypting ciphertext that starts at the block implied by `iv`.
    ///
    /// CTR decrypt == encrypt (XOR is symmetric); the two constructors
    /// exist for clarity at call sites.
    pub fn new_decryptor(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        Self::new(key, iv)
    }

    /// XOR the next `data.len()` keystream bytes into `data`.
    pub fn apply(&mut self, data: &mut [u8]) -> Result<(), CipherError> {
        // Fails only once 2^32 blocks have been consumed from one IV.
        self.cipher
            .try_apply_keystream(data)
            .map_err(|_| CipherError::InvalidRange)
    }

    /// Transform `input` into a new buffer of identical length.
    pub fn process(&mut self, input: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut output = input.to_vec();
        self.apply(&mut output)?;
        Ok(output)
    }
}

/// Decrypting `Read` adapter over a ciphertext stream.
///
/// The inner reader must be positioned at the ciphertext block matching the
/// transform's IV.
pub struct CipherReader<R> {
    inner: R,
    transform: CtrTransform,
}

impl<R: Read> CipherReader<R> {
    pub fn new(inner: R, transform: CtrTransform) -> Self {
        Self { inner, transform }
    }

    /// Decrypt and discard exactly `count` bytes.
    ///
    /// Loops until every byte has actually been produced: a single
    /// `read` on the underlying stream may legitimately return less.
    pub fn skip_exact(&mut self, count: u64) -> io::Result<()> {
        let mut scratch = [0u8; AES_BLOCK_SIZE];
        let mut remaining = count;
        while remaining > 0 {
            let want = remaining.min(AES_BLOCK_SIZE as u64) as usize;
            match self.read(&mut scratch[..want]) {
                Ok(0) => {
                    scratch.zeroize();
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "ciphertext ended while aligning to offset",
                    ));
                }
                Ok(n) => remaining -= n as u64,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    scratch.zeroize();
                    return Err(e);
                }
            }
        }
        scratch.zeroize();
        Ok(())
    }
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.transform.apply(&mut buf[..n]).map_err(io::Error::other)?;
        Ok(n)
    }
}

/// Encrypting `Write` adapter: every byte written is encrypted before it
/// reaches `inner`.
pub struct CipherWriter<W: Write> {
    inner: W,
    transform: CtrTransform,
    scratch: Vec<u8>,
}

impl<W: Write> CipherWriter<W> {
    pub fn new(inner: W, transform: CtrTransform) -> Self {
        Self {
            inner,
            transform,
            scratch: Vec::new(),
        }
    }

    /// Flush and hand back the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        self.scratch.zeroize();
        Ok(self.inner)
    }
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        // The keystream advances as soon as bytes are encrypted, so a chunk
        // is either written in full or the stream is broken.
        let chunk = &data[..data.len().min(WRITE_CHUNK)];
        self.scratch.clear();
        self.scratch.extend_from_slice(chunk);
        let result = self
            .transform
            .apply(&mut self.scratch)
            .map_err(io::Error::other)
            .and_then(|()| self.inner.write_all(&self.scratch));
        if result.is_err() {
            self.scratch.zeroize();
        }
        result.map(|()| chunk.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Encrypt data using AES-256-CTR.
///
/// Each encryption MUST use a unique IV with the same key.
/// Reusing nonce+key pairs is catastrophic for AES-CTR security.
///
/// CTR output is the same size as the input (no authentication tag).
pub fn encrypt_aes_ctr(
    plaintext: &[u8],
    key: &[u8; AES_KEY_SIZE],
    iv: &[u8; AES_CTR_IV_SIZE],
) -> Result<Vec<u8>, CipherError> {
    CtrTransform::new_encryptor(key, iv)?.process(plaintext)
}

/// Decrypt an arbitrary byte range `[start_byte, end_byte)` from a full
/// AES-256-CTR ciphertext held in memory.
///
/// Only the blocks covering the range are decrypted. Ranges running past
/// the end of `ciphertext` are clamped.
pub fn decrypt_aes_ctr_range(
    ciphertext: &[u8],
    key: &[u8; AES_KEY_SIZE],
    iv: &[u8; AES_CTR_IV_SIZE],
    start_byte: usize,
    end_byte: usize,
) -> Result<Vec<u8>, CipherError> {
    if start_byte > end_byte {
        return Err(CipherError::InvalidRange);
    }

    let end = end_byte.min(ciphertext.len());
    if start_byte >= end {
        return Ok(Vec::new());
    }

    let block = start_byte / AES_BLOCK_SIZE;
    let aligned_start = block * AES_BLOCK_SIZE;

    let mut transform = CtrTransform::new_decryptor(key, &iv_for_block(iv, block as u64))?;
    let mut decrypted = ciphertext[aligned_start..end].to_vec();
    transform.apply(&mut decrypted)?;

    Ok(decrypted.split_off(start_byte - aligned_start))
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIST SP 800-38A, F.5.5 CTR-AES256.Encrypt
    const NIST_KEY: &str = "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4";
    const NIST_IV: &str = "f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff";
    const NIST_PLAINTEXT: &str = "6bc1bee22e409f96e93d7e117393172a\
                                  ae2d8a571e03ac9c9eb76fac45af8e51\
                                  30c81c46a35ce411e5fbc1191a0a52ef\
                                  f69f2445df4f9b17ad2b417be66c3710";
    const NIST_CIPHERTEXT: &str = "601ec313775789a5b7a7f504bbf3d228\
                                   f443e3ca4d62b59aca84e990cacaf5c5\
                                   2b0930daa23de94ce87017ba2d84988d\
                                   dfc9c58db67aada613c2dd08457941a6";

    fn nist_key() -> [u8; 32] {
        hex::decode(NIST_KEY).unwrap().try_into().unwrap()
    }

    fn nist_iv() -> [u8; 16] {
        hex::decode(NIST_IV).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_nist_known_answer() {
        let plaintext = hex::decode(NIST_PLAINTEXT).unwrap();
        let ciphertext = encrypt_aes_ctr(&plaintext, &nist_key(), &nist_iv()).unwrap();
        assert_eq!(hex::encode(ciphertext), NIST_CIPHERTEXT);
    }

    #[test]
    fn test_range_matches_full_decrypt() {
        let ciphertext = hex::decode(NIST_CIPHERTEXT).unwrap();
        let plaintext = hex::decode(NIST_PLAINTEXT).unwrap();

        for (start, end) in [(0, 64), (1, 15), (15, 17), (16, 32), (17, 63), (40, 100)] {
            let range =
                decrypt_aes_ctr_range(&ciphertext, &nist_key(), &nist_iv(), start, end).unwrap();
            assert_eq!(range, plaintext[start..end.min(64)], "range {start}..{end}");
        }
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        let result = decrypt_aes_ctr_range(&[0u8; 32], &[0u8; 32], &[0u8; 16], 10, 5);
        assert_eq!(result, Err(CipherError::InvalidRange));
    }

    #[test]
    fn test_wrong_key_length_rejected() {
        let result = CtrTransform::new_decryptor(&[0u8; 16], &[0u8; 16]);
        assert!(matches!(result, Err(CipherError::InvalidKeyLength { len: 16 })));
    }

    #[test]
    fn test_wrong_iv_length_rejected() {
        let result = CtrTransform::new_encryptor(&[0u8; 32], &[0u8; 12]);
        assert!(matches!(result, Err(CipherError::InvalidIvLength { len: 12 })));
    }

    #[test]
    fn test_transform_continues_keystream() {
        let key = nist_key();
        let iv = nist_iv();
        let plaintext = hex::decode(NIST_PLAINTEXT).unwrap();

        let mut transform = CtrTransform::new_encryptor(&key, &iv).unwrap();
        let mut split = transform.process(&plaintext[..7]).unwrap();
        split.extend(transform.process(&plaintext[7..]).unwrap());

        assert_eq!(hex::encode(split), NIST_CIPHERTEXT);
    }

    #[test]
    fn test_counter_wrap_matches_derived_iv() {
        // Start two blocks before the 32-bit counter wraps.
        let key = [3u8; 32];
        let mut iv = [9u8; 16];
        iv[12..].copy_from_slice(&(u32::MAX - 1).to_be_bytes());

        let plaintext = [0x5Au8; 64];
        let ciphertext = encrypt_aes_ctr(&plaintext, &key, &iv).unwrap();

        let tail_iv = iv_for_block(&iv, 3);
        let tail = encrypt_aes_ctr(&plaintext[48..], &key, &tail_iv).unwrap();
        assert_eq!(&ciphertext[48..], &tail[..]);
    }

    /// Reader that hands out at most one byte per call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    #[test]
    fn test_skip_exact_survives_short_reads() {
        let ciphertext = hex::decode(NIST_CIPHERTEXT).unwrap();
        let plaintext = hex::decode(NIST_PLAINTEXT).unwrap();

        let transform = CtrTransform::new_decryptor(&nist_key(), &nist_iv()).unwrap();
        let mut reader = CipherReader::new(Trickle(&ciphertext), transform);
        reader.skip_exact(21).unwrap();

        let mut rest = [0u8; 10];
        reader.read_exact(&mut rest).unwrap();
        assert_eq!(&rest, &plaintext[21..31]);
    }

    #[test]
    fn test_skip_exact_past_end_is_eof() {
        let transform = CtrTransform::new_decryptor(&nist_key(), &nist_iv()).unwrap();
        let mut reader = CipherReader::new(&[0u8; 8][..], transform);
        let err = reader.skip_exact(9).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_cipher_writer_encrypts_large_writes_in_chunks() {
        let key = [1u8; 32];
        let iv = [2u8; 16];
        let plaintext: Vec<u8> = (0..3 * WRITE_CHUNK + 5).map(|i| i as u8).collect();

        let transform = CtrTransform::new_encryptor(&key, &iv).unwrap();
        let mut writer = CipherWriter::new(Vec::new(), transform);
        writer.write_all(&plaintext).unwrap();
        let written = writer.finish().unwrap();

        assert_eq!(written, encrypt_aes_ctr(&plaintext, &key, &iv).unwrap());
    }
}
