//! AES-256-CTR primitives for the container format.

pub mod aes_ctr;
pub mod counter;
pub mod key;
pub mod utils;

// Re-export primary functions for convenience
pub use aes_ctr::{
    decrypt_aes_ctr_range, encrypt_aes_ctr, CipherReader, CipherWriter, CtrTransform,
    AES_BLOCK_SIZE, AES_CTR_IV_SIZE, AES_KEY_SIZE,
};
pub use counter::{counter_of, iv_for_block, MAX_BLOCKS};
pub use key::AesKey;
pub use utils::{clear_bytes, generate_iv, generate_random_bytes};
