//! Cache configuration.
//!
//! Options are plain values owned by the cache that is built from them; there
//! is no process-wide setting, so caches with different checksum algorithms
//! can coexist.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::primitives::pager::{
    BUDDY_LOW_SHIFT, BUDDY_LOW_SHIFT_MIN, PAGE_SIZE_SHIFT_MAX, PAGE_SIZE_SHIFT_MIN,
};
use crate::types::{BufError, ChecksumAlgorithm};

/// Default page size shift (16 KiB pages).
pub const DEFAULT_PAGE_SIZE_SHIFT: u32 = 14;
/// Default number of page hash buckets.
pub const DEFAULT_HASH_BUCKETS: usize = 1024;

/// Tunables for a [`PageCache`](crate::primitives::pager::PageCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheOptions {
    /// log2 of the page size in bytes.
    pub page_size_shift: u32,
    /// log2 of the smallest buddy size class.
    pub buddy_low_shift: u32,
    /// Buckets in the page hash.
    pub hash_buckets: usize,
    /// Checksum algorithm for validating reads and stamping writes.
    pub checksum_algorithm: ChecksumAlgorithm,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            page_size_shift: DEFAULT_PAGE_SIZE_SHIFT,
            buddy_low_shift: BUDDY_LOW_SHIFT,
            hash_buckets: DEFAULT_HASH_BUCKETS,
            checksum_algorithm: ChecksumAlgorithm::default(),
        }
    }
}

impl CacheOptions {
    /// Page size in bytes.
    pub fn page_size(&self) -> usize {
        1usize << self.page_size_shift
    }

    /// Parses options from TOML text; absent keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let options: Self =
            toml::from_str(text).map_err(|source| ConfigError::Syntax { source })?;
        options.validate()?;
        Ok(options)
    }

    /// Reads and validates options from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let options: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Writes the options to `path` as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text =
            toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })?;
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks every field against the supported ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(PAGE_SIZE_SHIFT_MIN..=PAGE_SIZE_SHIFT_MAX).contains(&self.page_size_shift) {
            return Err(ConfigError::Invalid("page_size_shift must be within 12..=16"));
        }
        if !(BUDDY_LOW_SHIFT_MIN..self.page_size_shift).contains(&self.buddy_low_shift) {
            return Err(ConfigError::Invalid(
                "buddy_low_shift must be at least 9 and below page_size_shift",
            ));
        }
        if self.hash_buckets == 0 {
            return Err(ConfigError::Invalid("hash_buckets must be positive"));
        }
        Ok(())
    }
}

/// Failure to load, store, or validate [`CacheOptions`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for these options.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// Inline TOML text is malformed.
    #[error("failed to parse config: {source}")]
    Syntax {
        /// Underlying error.
        source: toml::de::Error,
    },
    /// The options could not be rendered as TOML.
    #[error("failed to serialize config: {source}")]
    Serialize {
        /// Underlying error.
        source: toml::ser::Error,
    },
    /// The file could not be written.
    #[error("failed to write config {path}: {source}")]
    Write {
        /// File that was written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A value is outside its supported range.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

impl From<ConfigError> for BufError {
    fn from(err: ConfigError) -> Self {
        BufError::Config(err.to_string())
    }
}
