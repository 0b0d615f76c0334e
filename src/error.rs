//! Error types for the container provider.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the AES-CTR layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("Invalid key size: expected 32 bytes, got {len}")]
    InvalidKeyLength { len: usize },
    #[error("Invalid IV size: expected 16 bytes, got {len}")]
    InvalidIvLength { len: usize },
    #[error("AES-256-CTR is not available")]
    Unsupported,
    #[error("Invalid range")]
    InvalidRange,
    #[error("Invalid key encoding")]
    InvalidEncoding,
}

/// Commit step that failed inside `WriteSession::commit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStep {
    /// An earlier `write` already failed; the session was poisoned.
    Write,
    /// Flushing the cipher stream into the temp file.
    Flush,
    /// Syncing the temp file to stable storage.
    Sync,
    /// Replacing the live container with the temp file.
    Rename,
}

impl std::fmt::Display for CommitStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommitStep::Write => "write",
            CommitStep::Flush => "flush",
            CommitStep::Sync => "sync",
            CommitStep::Rename => "rename",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// File is shorter than the IV prefix, or the prefix could not be read.
    #[error("Corrupt container header in {path:?}: file is {len} bytes")]
    CorruptHeader { path: PathBuf, len: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    /// The live container is untouched when this is returned.
    #[error("Commit failed at {step} step: {source}")]
    CommitFailed {
        step: CommitStep,
        #[source]
        source: io::Error,
    },

    #[error("A write session is already active for this container")]
    WriteInProgress,

    #[error("Plaintext would exceed the {limit}-byte container limit")]
    CapacityExceeded { limit: u64 },
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_failed_message_names_step() {
        let err = ProviderError::CommitFailed {
            step: CommitStep::Rename,
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "Commit failed at rename step: denied");
    }

    #[test]
    fn test_cipher_error_converts() {
        let err: ProviderError = CipherError::InvalidKeyLength { len: 16 }.into();
        assert!(matches!(
            err,
            ProviderError::Cipher(CipherError::InvalidKeyLength { len: 16 })
        ));
    }
}
