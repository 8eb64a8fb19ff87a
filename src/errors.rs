//! Engine error types
//!
//! Every engine operation surfaces failures as a single [`MstError`] that
//! carries one of the codes below:
//!
//! - MST_RANGE_ERROR (ERROR severity) - mfn, tag or offset out of bounds
//! - MST_FORMAT_ERROR (FATAL severity) - unrecognized or corrupted on-disk data
//! - MST_CAPACITY_ERROR (ERROR severity) - record or pointer exceeds format maximum
//! - MST_LOCK_ERROR (ERROR severity) - retry budget exhausted, invariant violated, held by another
//! - MST_IO_ERROR (ERROR severity) - underlying read/write/seek failure
//! - MST_STATE_ERROR (ERROR severity) - operation invalid for the record's status
//! - MST_CONFIG_ERROR (ERROR severity) - options that cannot describe a database

use std::fmt;
use std::io;

/// Severity levels for engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, handle stays usable
    Error,
    /// The files are not trustworthy; the caller should stop using them
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Engine error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MstErrorCode {
    /// Record number, tag or offset out of bounds
    Range,
    /// Unrecognized or corrupted leader, directory mismatch, unsupported file type
    Format,
    /// Record or cross-reference pointer exceeds the format maximum
    Capacity,
    /// Lock retry budget exhausted, protocol invariant violated, or lock held by another
    Lock,
    /// Underlying read/write/seek failure
    Io,
    /// Operation invalid for the current record status
    State,
    /// Configuration cannot be applied
    Config,
}

impl MstErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            MstErrorCode::Range => "MST_RANGE_ERROR",
            MstErrorCode::Format => "MST_FORMAT_ERROR",
            MstErrorCode::Capacity => "MST_CAPACITY_ERROR",
            MstErrorCode::Lock => "MST_LOCK_ERROR",
            MstErrorCode::Io => "MST_IO_ERROR",
            MstErrorCode::State => "MST_STATE_ERROR",
            MstErrorCode::Config => "MST_CONFIG_ERROR",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            MstErrorCode::Format => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for MstErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Engine error with full context
#[derive(Debug)]
pub struct MstError {
    code: MstErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl MstError {
    fn new(code: MstErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Record number or offset out of bounds
    pub fn range(message: impl Into<String>) -> Self {
        Self::new(MstErrorCode::Range, message)
    }

    /// Out-of-range record number, with the valid bound attached
    pub fn mfn_out_of_range(mfn: u32, next_mfn: u32) -> Self {
        Self::new(MstErrorCode::Range, format!("mfn {} out of range", mfn))
            .with_details(format!("valid: 1..={}", next_mfn.saturating_sub(1)))
    }

    /// Unrecognized or corrupted on-disk data
    pub fn format(message: impl Into<String>) -> Self {
        Self::new(MstErrorCode::Format, message)
    }

    /// Corrupted on-disk data at a known byte offset
    pub fn format_at_offset(offset: u64, message: impl Into<String>) -> Self {
        Self::new(MstErrorCode::Format, message).with_details(format!("byte_offset: {}", offset))
    }

    /// Record or pointer larger than the format allows
    pub fn capacity(message: impl Into<String>) -> Self {
        Self::new(MstErrorCode::Capacity, message)
    }

    /// Lock protocol failure
    pub fn lock(message: impl Into<String>) -> Self {
        Self::new(MstErrorCode::Lock, message)
    }

    /// Operation invalid for the record's status
    pub fn state(message: impl Into<String>) -> Self {
        Self::new(MstErrorCode::State, message)
    }

    /// Invalid configuration
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(MstErrorCode::Config, message)
    }

    /// Wrapped I/O failure
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: MstErrorCode::Io,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Attach details (offsets, paths, bounds) to an error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> MstErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether the database files should be considered untrustworthy
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for MstError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for MstError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for engine operations
pub type MstResult<T> = Result<T, MstError>;
