//! Per-block IV derivation for AES-CTR.
//!
//! The 16-byte IV is split into a 12-byte nonce and a 4-byte big-endian
//! counter. Block `n` of a container is encrypted under `nonce || (c + n)`,
//! where `c` is the counter stored in the container's IV prefix. Only the
//! counter bytes ever change; the nonce is fixed for the life of the file.

use super::aes_ctr::AES_CTR_IV_SIZE;

/// Byte offset of the counter field inside the IV.
pub const COUNTER_OFFSET: usize = 12;

/// Number of distinct blocks a 32-bit counter can address before it wraps.
pub const MAX_BLOCKS: u64 = 1 << 32;

/// Read the big-endian 32-bit counter from the tail of an IV.
pub fn counter_of(iv: &[u8; AES_CTR_IV_SIZE]) -> u32 {
    let mut counter = [0u8; 4];
    counter.copy_from_slice(&iv[COUNTER_OFFSET..]);
    u32::from_be_bytes(counter)
}

/// Compute the IV for block `block`, counting from `base_iv`.
///
/// The counter wraps modulo 2^32 and never carries into the nonce.
pub fn iv_for_block(base_iv: &[u8; AES_CTR_IV_SIZE], block: u64) -> [u8; AES_CTR_IV_SIZE] {
    // Truncation is the modulo: only the low 32 bits of `block` can move the counter.
    let counter = counter_of(base_iv).wrapping_add(block as u32);

    let mut iv = *base_iv;
    iv[COUNTER_OFFSET..].copy_from_slice(&counter.to_be_bytes());
    iv
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_zero_is_base_iv() {
        let base = [7u8; 16];
        assert_eq!(iv_for_block(&base, 0), base);
    }

    #[test]
    fn test_increments_low_bytes_big_endian() {
        let mut base = [0u8; 16];
        base[15] = 0xFE;
        let iv = iv_for_block(&base, 3);
        assert_eq!(&iv[12..], &[0x00, 0x00, 0x01, 0x01]);
        assert_eq!(&iv[..12], &[0u8; 12]);
    }

    #[test]
    fn test_counter_wraps_without_touching_nonce() {
        let mut base = [0xAAu8; 16];
        base[12..].copy_from_slice(&u32::MAX.to_be_bytes());

        let iv = iv_for_block(&base, 2);
        assert_eq!(counter_of(&iv), 1);
        assert_eq!(&iv[..12], &[0xAAu8; 12]);
    }

    #[test]
    fn test_block_beyond_counter_range_is_modular() {
        let base = [0u8; 16];
        assert_eq!(iv_for_block(&base, MAX_BLOCKS + 5), iv_for_block(&base, 5));
    }
}
