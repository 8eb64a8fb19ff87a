//! Database configuration
//!
//! A [`MasterConfig`] is normally loaded from a JSON file; every key is
//! optional. Format keys left unset (`byte_order`, `extended`, `filler`)
//! are detected from the files on open and take defaults on create.
//!
//! ```json
//! {
//!   "encoding": "cp850",
//!   "max_size_gb": 4,
//!   "multi_user": true,
//!   "lock_retries": 100,
//!   "lock_backoff_ms": 20
//! }
//! ```

mod paths;

pub use paths::{DatabasePaths, MASTER_EXTENSION, XRF_EXTENSION};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::binary::ByteOrder;
use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::codec::{Encoding, MAX_SHIFT};
use crate::errors::MstError;
use crate::observability::{log_event_with_fields, Event};
use crate::xrf::XrfEntry;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("filler must be 0 or 2, got {0}")]
    InvalidFiller(u8),

    #[error("shift must be 0..={max}, got {0}", max = MAX_SHIFT)]
    ShiftOutOfRange(u8),

    #[error("max_size_gb {0} exceeds the largest addressable database")]
    SizeTooLarge(u64),

    #[error("lock_retries must be > 0")]
    NoLockAttempts,

    #[error("{0}")]
    Conflict(&'static str),
}

impl From<ConfigError> for MstError {
    fn from(e: ConfigError) -> Self {
        MstError::config(e.to_string())
    }
}

/// How text is converted to and from field bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingChoice {
    Fixed(Encoding),
    /// Sample the master file and let the guesser decide.
    Auto,
}

/// Cross-reference store strategy selected by the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrfStrategy {
    Direct,
    Paged { write_through: bool },
    Memory,
}

/// Bounded retry budget for the lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
    /// Overall limit across all attempts.
    pub deadline: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts,
            backoff,
            deadline: None,
        }
    }

    pub fn with_deadline(self, deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(default_lock_retries(), Duration::from_millis(default_lock_backoff_ms()))
    }
}

/// Options for creating or opening a database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MasterConfig {
    /// Encoding name, or "auto"
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Unset: detect on open, direct on create
    #[serde(default)]
    pub byte_order: Option<ByteOrder>,

    /// Unset: detect on open, standard on create
    #[serde(default)]
    pub extended: Option<bool>,

    /// Unset: detect on open, platform default on create
    #[serde(default)]
    pub filler: Option<u8>,

    #[serde(default)]
    pub shift: u8,

    /// Alternative to `shift`; 0 keeps the default 512 MB address space
    #[serde(default)]
    pub max_size_gb: u64,

    #[serde(default)]
    pub multi_user: bool,

    #[serde(default)]
    pub in_memory_master: bool,

    #[serde(default)]
    pub in_memory_xrf: bool,

    #[serde(default)]
    pub xrf_write_through: bool,

    #[serde(default = "default_true")]
    pub xrf_page_cache: bool,

    /// Wraps the disk engine in the write-back record cache
    #[serde(default)]
    pub record_cache: bool,

    /// Cache size; 0 means the default capacity. Any non-zero value also
    /// enables the cache.
    #[serde(default)]
    pub record_cache_capacity: usize,

    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    #[serde(default = "default_lock_backoff_ms")]
    pub lock_backoff_ms: u64,

    #[serde(default)]
    pub lock_deadline_ms: Option<u64>,
}

fn default_encoding() -> String {
    Encoding::default().name().to_string()
}
fn default_true() -> bool {
    true
}
fn default_lock_retries() -> u32 {
    3000
}
fn default_lock_backoff_ms() -> u64 {
    50
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            encoding: default_encoding(),
            byte_order: None,
            extended: None,
            filler: None,
            shift: 0,
            max_size_gb: 0,
            multi_user: false,
            in_memory_master: false,
            in_memory_xrf: false,
            xrf_write_through: false,
            xrf_page_cache: true,
            record_cache: false,
            record_cache_capacity: 0,
            lock_retries: default_lock_retries(),
            lock_backoff_ms: default_lock_backoff_ms(),
            lock_deadline_ms: None,
        }
    }
}

impl MasterConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&content)?;
        log_event_with_fields(
            Event::ConfigLoaded,
            &[("path", path.display().to_string().as_str())],
        );
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: MasterConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.encoding_choice()?;

        if let Some(filler) = self.filler {
            if filler != 0 && filler != 2 {
                return Err(ConfigError::InvalidFiller(filler));
            }
        }

        if self.shift > MAX_SHIFT {
            return Err(ConfigError::ShiftOutOfRange(self.shift));
        }
        shift_for_size_gb(self.max_size_gb)?;

        if self.lock_retries == 0 {
            return Err(ConfigError::NoLockAttempts);
        }

        if self.multi_user && self.in_memory_xrf {
            return Err(ConfigError::Conflict(
                "in_memory_xrf cannot be combined with multi_user",
            ));
        }
        if self.multi_user && self.in_memory_master {
            return Err(ConfigError::Conflict(
                "in_memory_master cannot be combined with multi_user",
            ));
        }
        if self.multi_user && self.record_cache_size().is_some() {
            return Err(ConfigError::Conflict(
                "record_cache cannot be combined with multi_user",
            ));
        }

        Ok(())
    }

    pub fn encoding_choice(&self) -> Result<EncodingChoice, ConfigError> {
        if self.encoding.eq_ignore_ascii_case("auto") {
            return Ok(EncodingChoice::Auto);
        }
        Encoding::from_name(&self.encoding)
            .map(EncodingChoice::Fixed)
            .ok_or_else(|| ConfigError::UnknownEncoding(self.encoding.clone()))
    }

    /// Capacity of the write-back record cache, if it is enabled.
    pub fn record_cache_size(&self) -> Option<usize> {
        if self.record_cache_capacity > 0 {
            Some(self.record_cache_capacity)
        } else if self.record_cache {
            Some(DEFAULT_CACHE_CAPACITY)
        } else {
            None
        }
    }

    /// The larger of `shift` and the shift implied by `max_size_gb`.
    pub fn resolved_shift(&self) -> Result<u8, ConfigError> {
        if self.shift > MAX_SHIFT {
            return Err(ConfigError::ShiftOutOfRange(self.shift));
        }
        Ok(self.shift.max(shift_for_size_gb(self.max_size_gb)?))
    }

    /// Multi-user handles always go to disk for pointers so they observe
    /// writes made by other processes.
    pub fn xrf_strategy(&self) -> XrfStrategy {
        if self.multi_user {
            XrfStrategy::Direct
        } else if self.in_memory_xrf {
            XrfStrategy::Memory
        } else if self.xrf_page_cache {
            XrfStrategy::Paged {
                write_through: self.xrf_write_through,
            }
        } else {
            XrfStrategy::Direct
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.lock_retries, Duration::from_millis(self.lock_backoff_ms));
        match self.lock_deadline_ms {
            Some(ms) => policy.with_deadline(Duration::from_millis(ms)),
            None => policy,
        }
    }
}

/// Smallest shift whose address space holds `gb` gigabytes.
pub fn shift_for_size_gb(gb: u64) -> Result<u8, ConfigError> {
    if gb == 0 {
        return Ok(0);
    }
    let wanted = gb.saturating_mul(1 << 30);
    (0..=MAX_SHIFT)
        .find(|&shift| XrfEntry::capacity_bytes(shift) >= wanted)
        .ok_or(ConfigError::SizeTooLarge(gb))
}
