//! Seekable, thread-safe AES-256-CTR encrypted file container.
//!
//! A container is a 16-byte IV followed by the AES-256-CTR ciphertext of
//! the payload. `Provider` answers `read(offset, length)` on the plaintext
//! by decrypting only the blocks it needs, from any number of threads, and
//! rewrites the container atomically on save under a fresh IV.
//!
//! ```no_run
//! use ctr_container::{AesKey, Provider, WriteMode};
//!
//! # fn main() -> ctr_container::Result<()> {
//! let key = AesKey::from_base64("EQQlw3SNbBwbxkSi1jwwib4B4XqesCVDZv9LftsmE1U=")?;
//! let provider = Provider::open("/data/document.enc", key)?;
//! let header = provider.read(0, 8)?;
//!
//! let mut session = provider.begin_write(WriteMode::Overwrite)?;
//! session.write(&header)?;
//! session.commit()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod container;
pub mod crypto;
pub mod error;
pub mod provider;

pub use config::ProviderConfig;
pub use container::{FileOps, Header, StdFileOps, TempFile};
pub use crypto::AesKey;
pub use error::{CipherError, CommitStep, ProviderError, Result};
pub use provider::{Provider, Reader, WriteMode, WriteSession};
