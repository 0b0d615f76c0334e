//! On-disk container layout.
//!
//! ```text
//! offset 0        : 16 bytes, base IV (nonce[0..12] || counter[12..16], big-endian)
//! offset 16..N+16 : N bytes, AES-256-CTR ciphertext of N plaintext bytes
//! ```

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::crypto::{AES_BLOCK_SIZE, AES_CTR_IV_SIZE};
use crate::error::{ProviderError, Result};

/// Size of the IV prefix in bytes.
pub const IV_SIZE: u64 = AES_CTR_IV_SIZE as u64;

const BLOCK: u64 = AES_BLOCK_SIZE as u64;

/// Parsed container prefix plus the plaintext length implied by the file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub iv: [u8; AES_CTR_IV_SIZE],
    pub plaintext_size: u64,
}

/// Open `path` and load its header.
pub fn load_header(path: &Path) -> Result<Header> {
    let mut file = File::open(path)?;
    read_header(&mut file, path)
}

/// Load the header from an already open container handle.
///
/// Leaves the handle positioned just past the IV.
pub fn read_header(file: &mut File, path: &Path) -> Result<Header> {
    let file_len = file.metadata()?.len();
    if file_len < IV_SIZE {
        return Err(ProviderError::CorruptHeader {
            path: path.to_path_buf(),
            len: file_len,
        });
    }

    let mut iv = [0u8; AES_CTR_IV_SIZE];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut iv).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ProviderError::CorruptHeader {
            path: path.to_path_buf(),
            len: file_len,
        },
        _ => ProviderError::Io(e),
    })?;

    Ok(Header {
        iv,
        plaintext_size: file_len - IV_SIZE,
    })
}

/// File offset of a plaintext byte.
pub fn ciphertext_offset(plaintext_offset: u64) -> u64 {
    plaintext_offset + IV_SIZE
}

/// Index of the AES block containing a plaintext byte.
pub fn block_of(plaintext_offset: u64) -> u64 {
    plaintext_offset / BLOCK
}

/// Position of a plaintext byte inside its block.
pub fn block_skip(plaintext_offset: u64) -> u64 {
    plaintext_offset % BLOCK
}

/// Number of bytes a read of `length` at `offset` can return from a
/// plaintext of `size` bytes. Zero when `offset` is at or past the end.
pub fn clamp_len(size: u64, offset: u64, length: u64) -> u64 {
    size.saturating_sub(offset).min(length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_offsets() {
        assert_eq!(ciphertext_offset(0), 16);
        assert_eq!(block_of(15), 0);
        assert_eq!(block_of(16), 1);
        assert_eq!(block_skip(17), 1);
        assert_eq!(block_skip(32), 0);
    }

    #[test]
    fn test_clamp_len() {
        assert_eq!(clamp_len(64, 0, 10), 10);
        assert_eq!(clamp_len(64, 60, 10), 4);
        assert_eq!(clamp_len(64, 64, 10), 0);
        assert_eq!(clamp_len(64, 100, 10), 0);
    }

    #[test]
    fn test_load_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.enc");
        let mut file = File::create(&path).unwrap();
        file.write_all(&[9u8; 16]).unwrap();
        file.write_all(&[0u8; 40]).unwrap();
        drop(file);

        let header = load_header(&path).unwrap();
        assert_eq!(header.iv, [9u8; 16]);
        assert_eq!(header.plaintext_size, 40);
    }

    #[test]
    fn test_iv_only_container_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.enc");
        std::fs::write(&path, [1u8; 16]).unwrap();

        assert_eq!(load_header(&path).unwrap().plaintext_size, 0);
    }

    #[test]
    fn test_short_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.enc");
        std::fs::write(&path, [1u8; 15]).unwrap();

        let err = load_header(&path).unwrap_err();
        assert!(matches!(err, ProviderError::CorruptHeader { len: 15, .. }));
    }
}
