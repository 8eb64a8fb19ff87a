//! Observable engine events
//!
//! Only lifecycle and exceptional events are logged; per-record reads and
//! writes are counted in [`EngineMetrics`](super::EngineMetrics) instead.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// New master/xrf pair created
    MasterCreate,
    /// Existing database opened
    MasterOpen,
    /// Database flushed and closed
    MasterClose,
    /// Implicit close on drop failed; buffered state may be lost
    MasterCloseFailed,
    /// Configuration file loaded
    ConfigLoaded,

    // Format detection
    /// Byte order and layout recovered from file contents
    FormatDetected,
    /// Detection had no data; platform defaults used
    FormatFallback,
    /// Character encoding chosen by sampling
    EncodingGuessed,

    // Write path
    /// Skipped record numbers filled with tombstones
    TombstonesWritten,
    /// Cross-reference file grew by one or more blocks
    XrfBlockExtended,

    // Locking
    /// Data-entry or exclusive-write lock taken
    LockAcquired,
    /// Data-entry or exclusive-write lock released
    LockReleased,
    /// Retry budget or deadline exhausted
    LockRetryExhausted,
    /// Per-record lock taken
    RecordLocked,
    /// Per-record lock released by its owner
    RecordUnlocked,
    /// Per-record lock cleared without ownership check
    RecordForceUnlocked,

    // Caching
    /// Oldest cache entry dropped to stay within capacity
    CacheEvict,
    /// Dirty cache entries written to the disk engine
    CacheFlush,
    /// Dirty entries could not be written back on drop
    CacheWriteBackFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::MasterCreate => "MASTER_CREATE",
            Event::MasterOpen => "MASTER_OPEN",
            Event::MasterClose => "MASTER_CLOSE",
            Event::MasterCloseFailed => "MASTER_CLOSE_FAILED",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::FormatDetected => "FORMAT_DETECTED",
            Event::FormatFallback => "FORMAT_FALLBACK",
            Event::EncodingGuessed => "ENCODING_GUESSED",
            Event::TombstonesWritten => "TOMBSTONES_WRITTEN",
            Event::XrfBlockExtended => "XRF_BLOCK_EXTENDED",
            Event::LockAcquired => "LOCK_ACQUIRED",
            Event::LockReleased => "LOCK_RELEASED",
            Event::LockRetryExhausted => "LOCK_RETRY_EXHAUSTED",
            Event::RecordLocked => "RECORD_LOCKED",
            Event::RecordUnlocked => "RECORD_UNLOCKED",
            Event::RecordForceUnlocked => "RECORD_FORCE_UNLOCKED",
            Event::CacheEvict => "CACHE_EVICT",
            Event::CacheFlush => "CACHE_FLUSH",
            Event::CacheWriteBackFailed => "CACHE_WRITE_BACK_FAILED",
        }
    }

    /// Events that indicate a caller-visible failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::LockRetryExhausted | Event::MasterCloseFailed | Event::CacheWriteBackFailed
        )
    }

    /// Events that indicate degraded but working behaviour.
    pub fn is_warning(&self) -> bool {
        matches!(self, Event::FormatFallback | Event::RecordForceUnlocked)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
