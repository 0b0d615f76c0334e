//! Utility functions for cryptographic operations.

use rand::RngCore;
use zeroize::Zeroize;

use super::aes_ctr::AES_CTR_IV_SIZE;

/// Generate cryptographically secure random bytes.
pub fn generate_random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

/// Generate a random 16-byte AES-CTR base IV (nonce and initial counter).
pub fn generate_iv() -> [u8; AES_CTR_IV_SIZE] {
    let mut iv = [0u8; AES_CTR_IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    iv
}

/// Zeroize sensitive data in a byte slice.
pub fn clear_bytes(buf: &mut [u8]) {
    buf.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_iv_is_fresh() {
        assert_ne!(generate_iv(), generate_iv());
    }

    #[test]
    fn test_generate_random_bytes_len() {
        assert_eq!(generate_random_bytes(33).len(), 33);
    }

    #[test]
    fn test_clear_bytes() {
        let mut buf = [0xFFu8; 8];
        clear_bytes(&mut buf);
        assert_eq!(buf, [0u8; 8]);
    }
}
