//! Error types for blur engine operations.
//!
//! Every failure the engine can report travels as an [`Error`]: validation
//! failures detected synchronously at submission, failures inside a worker,
//! and configuration problems at construction time.
//!
//! # Usage
//!
//! ```rust
//! use blur_core::{Error, ErrorKind, Result};
//!
//! fn check(intensity: f64) -> Result<()> {
//!     if !(0.0..=10.0).contains(&intensity) {
//!         return Err(Error::InvalidIntensity(intensity));
//!     }
//!     Ok(())
//! }
//!
//! let err = check(12.0).unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::InvalidIntensity);
//! ```
//!
//! # Used By
//!
//! - `blur-ops` - its `OpsError` converts into [`Error::ProcessingFailed`]
//! - `blur-cache` - limit validation
//! - `blur-engine` - request validation and completion delivery

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the blur engine.
///
/// Validation errors are never raised as panics. They are delivered through
/// the same callback channel as successful results, so callers branch on the
/// `Result` they receive.
#[derive(Debug, Error)]
pub enum Error {
    /// Intensity is NaN, infinite, or outside `[0, 10]`.
    #[error("invalid blur intensity: {0} (expected 0.0..=10.0)")]
    InvalidIntensity(f64),

    /// Image has bad dimensions, an unsupported format, or too little data.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Submission after the processor was destroyed.
    #[error("processor has been destroyed")]
    ProcessorDestroyed,

    /// Worker pool could not be created or a job could not be queued.
    #[error("thread pool failure: {0}")]
    ThreadPoolFailure(String),

    /// Request was cancelled.
    ///
    /// Reserved for explicit-cancel reporting; the silent discard of a
    /// cancelled request never produces this.
    #[error("request cancelled")]
    Cancelled,

    /// Blur failed inside a worker.
    #[error("blur processing failed: {0}")]
    ProcessingFailed(String),

    /// Buffer allocation failed.
    #[error("failed to allocate {0} bytes")]
    AllocationFailed(usize),

    /// Constructor or configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error while loading configuration or images.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fieldless discriminant of [`Error`], convenient for matching in callbacks
/// and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::InvalidIntensity`].
    InvalidIntensity,
    /// See [`Error::InvalidImage`].
    InvalidImage,
    /// See [`Error::ProcessorDestroyed`].
    ProcessorDestroyed,
    /// See [`Error::ThreadPoolFailure`].
    ThreadPoolFailure,
    /// See [`Error::Cancelled`].
    Cancelled,
    /// See [`Error::ProcessingFailed`].
    ProcessingFailed,
    /// See [`Error::AllocationFailed`].
    AllocationFailed,
    /// See [`Error::InvalidConfig`].
    InvalidConfig,
    /// See [`Error::Io`].
    Io,
}

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIntensity(_) => ErrorKind::InvalidIntensity,
            Self::InvalidImage(_) => ErrorKind::InvalidImage,
            Self::ProcessorDestroyed => ErrorKind::ProcessorDestroyed,
            Self::ThreadPoolFailure(_) => ErrorKind::ThreadPoolFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ProcessingFailed(_) => ErrorKind::ProcessingFailed,
            Self::AllocationFailed(_) => ErrorKind::AllocationFailed,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// True for errors caught by synchronous validation at submission.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidIntensity(_) | Self::InvalidImage(_))
    }
}
