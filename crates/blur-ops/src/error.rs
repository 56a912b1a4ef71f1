//! Error types for blur operations.

use thiserror::Error;

/// Error type for kernel and convolution operations.
#[derive(Error, Debug)]
pub enum OpsError {
    /// Invalid dimensions or buffer sizes.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for blur operations.
pub type OpsResult<T> = Result<T, OpsError>;

impl From<OpsError> for blur_core::Error {
    fn from(err: OpsError) -> Self {
        blur_core::Error::ProcessingFailed(err.to_string())
    }
}
