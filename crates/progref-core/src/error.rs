//! Error types for latent tensors and context windows.

use thiserror::Error;

use crate::types::{DType, LatentShape};

/// Result type alias for core operations.
pub type Result<T> = core::result::Result<T, CoreError>;

/// Core error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A shape has a zero or otherwise unusable dimension.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Raw buffer length does not match shape and dtype.
    #[error("buffer size mismatch for {shape} {dtype}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        shape: LatentShape,
        dtype: DType,
        expected: usize,
        actual: usize,
    },

    /// Element type is not the one an operation needs.
    #[error("dtype mismatch: expected {expected}, got {actual}")]
    DTypeMismatch { expected: DType, actual: DType },

    /// Context window geometry is invalid.
    #[error("invalid context window: {0}")]
    InvalidWindow(String),

    /// Requested frames fall outside the tensor's frame axis.
    #[error("frame range {start}..{end} outside 0..{frames}")]
    FrameRange {
        start: usize,
        end: usize,
        frames: usize,
    },
}

impl CoreError {
    /// Create an invalid shape error.
    pub fn invalid_shape(message: impl Into<String>) -> Self {
        CoreError::InvalidShape(message.into())
    }

    /// Create an invalid window error.
    pub fn invalid_window(message: impl Into<String>) -> Self {
        CoreError::InvalidWindow(message.into())
    }

    /// Get error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::InvalidShape(_) => "invalid_shape",
            CoreError::SizeMismatch { .. } => "size_mismatch",
            CoreError::DTypeMismatch { .. } => "dtype_mismatch",
            CoreError::InvalidWindow(_) => "invalid_window",
            CoreError::FrameRange { .. } => "frame_range",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::FrameRange {
            start: 75,
            end: 80,
            frames: 60,
        };
        assert_eq!(err.to_string(), "frame range 75..80 outside 0..60");
        assert_eq!(err.category(), "frame_range");
    }

    #[test]
    fn test_size_mismatch_display() {
        let err = CoreError::SizeMismatch {
            shape: LatentShape::new(16, 5, 8, 8),
            dtype: DType::F16,
            expected: 10240,
            actual: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("f16"));
        assert!(msg.contains("10240"));
    }
}
