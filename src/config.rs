//! Provider configuration.

use serde::{Deserialize, Serialize};

use crate::crypto::{AES_BLOCK_SIZE, MAX_BLOCKS};

/// Largest plaintext a single IV can encrypt before the 32-bit counter wraps (64 GiB).
pub const DEFAULT_MAX_PLAINTEXT_LEN: u64 = MAX_BLOCKS * AES_BLOCK_SIZE as u64;

/// Tunables for a `Provider`. Every field has a default, so partial JSON is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Suffix appended to the container's file name to form the sibling temp file.
    pub temp_suffix: String,
    /// Sync the temp file to disk before it replaces the container.
    pub sync_on_commit: bool,
    /// Write sessions refuse plaintext beyond this many bytes.
    pub max_plaintext_len: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            temp_suffix: ".tmp".to_string(),
            sync_on_commit: true,
            max_plaintext_len: DEFAULT_MAX_PLAINTEXT_LEN,
        }
    }
}

impl ProviderConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.clamped())
    }

    /// The counter limit is a property of the format, not a preference.
    pub(crate) fn clamped(mut self) -> Self {
        self.max_plaintext_len = self.max_plaintext_len.min(DEFAULT_MAX_PLAINTEXT_LEN);
        if self.temp_suffix.is_empty() {
            self.temp_suffix = Self::default().temp_suffix;
        }
        self
    }
}
