//! Error types for progressive-reference caching

use progref_core::{CoreError, DType, LatentShape};
use thiserror::Error;

use crate::tracker::WindowPhase;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur while caching window latents
#[derive(Error, Debug)]
pub enum CacheError {
    /// Stored slice does not have the run's slice shape
    #[error(
        "Invalid slice for window {window_index}: \
         expected {expected} {expected_dtype}, got {actual} {actual_dtype}"
    )]
    InvalidSlice {
        window_index: usize,
        expected: LatentShape,
        expected_dtype: DType,
        actual: LatentShape,
        actual_dtype: DType,
    },

    /// Cached slice is incompatible with the attention module's reference input
    #[error(
        "Reference shape mismatch: \
         attention expects {expected} {expected_dtype}, got {actual} {actual_dtype}"
    )]
    ShapeMismatch {
        expected: LatentShape,
        expected_dtype: DType,
        actual: LatentShape,
        actual_dtype: DType,
    },

    /// Frame sub-range could not be extracted from a window's latents
    #[error("Extraction failed for window {window_index}: {reason}")]
    Extraction { window_index: usize, reason: String },

    /// Configuration rejected before any compute starts
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Window completed after a later one
    #[error("Window {window_index} completed out of order (last completed {last_completed})")]
    OutOfOrder {
        window_index: usize,
        last_completed: usize,
    },

    /// Window state machine moved backwards
    #[error("Window {window_index} cannot move from {from:?} to {to:?}")]
    PhaseRegression {
        window_index: usize,
        from: WindowPhase,
        to: WindowPhase,
    },

    /// Tensor or window error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parse error
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    /// Whether the run can continue on the static reference after this error.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            CacheError::ShapeMismatch { .. } | CacheError::Extraction { .. }
        )
    }
}
