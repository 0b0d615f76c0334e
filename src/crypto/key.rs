//! AES-256 key material.
//!
//! The provider is handed raw key bytes; decoding from text encodings
//! happens here, before a key ever reaches a provider.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::aes_ctr::AES_KEY_SIZE;
use crate::error::CipherError;

/// A 256-bit AES key. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AesKey([u8; AES_KEY_SIZE]);

impl AesKey {
    pub fn new(bytes: [u8; AES_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CipherError> {
        let key: [u8; AES_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CipherError::InvalidKeyLength { len: bytes.len() })?;
        Ok(Self(key))
    }

    /// Decode a base64 (standard alphabet, padded) key.
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .map_err(|_| CipherError::InvalidEncoding)?,
        );
        Self::from_slice(&decoded)
    }

    pub fn from_hex(encoded: &str) -> Result<Self, CipherError> {
        let decoded = Zeroizing::new(
            hex::decode(encoded.trim()).map_err(|_| CipherError::InvalidEncoding)?,
        );
        Self::from_slice(&decoded)
    }

    /// Generate a random key from the OS RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; AES_KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; AES_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_base64() {
        let key = AesKey::from_base64("EQQlw3SNbBwbxkSi1jwwib4B4XqesCVDZv9LftsmE1U=").unwrap();
        assert_eq!(key.as_bytes()[0], 0x11);
        assert_eq!(key.as_bytes()[31], 0x55);
    }

    #[test]
    fn test_from_base64_wrong_length() {
        let result = AesKey::from_base64("AAAA");
        assert!(matches!(result, Err(CipherError::InvalidKeyLength { len: 3 })));
    }

    #[test]
    fn test_from_base64_garbage() {
        let result = AesKey::from_base64("not base64!");
        assert!(matches!(result, Err(CipherError::InvalidEncoding)));
    }

    #[test]
    fn test_from_hex() {
        let key = AesKey::from_hex(&"ab".repeat(32)).unwrap();
        assert_eq!(key.as_bytes(), &[0xAB; 32]);
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = AesKey::new([0x42; 32]);
        let printed = format!("{:?}", key);
        assert!(!printed.contains("42"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn test_generate_keys_differ() {
        assert_ne!(AesKey::generate().as_bytes(), AesKey::generate().as_bytes());
    }
}
