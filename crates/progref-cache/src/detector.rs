//! Window boundary detection and slice extraction

use crate::{BufferPolicy, CacheError, Result, SelectionRange, WindowLatentCache};
use progref_core::{ContextWindow, LatentTensor};
use tracing::{debug, warn};

/// Why a window produced no slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Progressive reference is switched off
    Disabled,
    /// The selected frames could not be read from the window's latents
    ExtractionFailed(String),
}

/// Result of handling a finished window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryOutcome {
    /// Slice copied into the cache
    Extracted {
        /// Windows evicted to make room
        evicted: Vec<usize>,
        /// The store replaced a slice already cached for this window
        retried: bool,
    },
    /// Nothing stored; the next window falls back to the static reference
    Skipped(SkipReason),
}

impl BoundaryOutcome {
    pub fn is_extracted(&self) -> bool {
        matches!(self, BoundaryOutcome::Extracted { .. })
    }
}

/// Hooks the end of each window's denoising pass.
///
/// Must run after the window's latents are final and before the host merges
/// them into the overlapping global buffer.
#[derive(Debug, Clone)]
pub struct BoundaryDetector {
    enabled: bool,
    selection: SelectionRange,
    last_completed: Option<usize>,
}

impl BoundaryDetector {
    pub fn new(policy: &BufferPolicy) -> Self {
        Self {
            enabled: policy.enabled,
            selection: policy.selection_range,
            last_completed: None,
        }
    }

    /// Highest window handled so far
    pub fn last_completed(&self) -> Option<usize> {
        self.last_completed
    }

    /// Extract the selected frames of a finished window and cache them.
    ///
    /// `denoised` is only read. Calling again for the same window re-stores
    /// the slice; an earlier window than the last one handled is refused.
    pub fn on_window_complete(
        &mut self,
        window: &ContextWindow,
        denoised: &LatentTensor,
        cache: &mut WindowLatentCache,
    ) -> Result<BoundaryOutcome> {
        if !self.enabled {
            return Ok(BoundaryOutcome::Skipped(SkipReason::Disabled));
        }

        if let Some(last) = self.last_completed {
            if window.index < last {
                return Err(CacheError::OutOfOrder {
                    window_index: window.index,
                    last_completed: last,
                });
            }
        }
        self.last_completed = Some(window.index);

        let slice = match self.extract(window, denoised) {
            Ok(slice) => slice,
            Err(err) => {
                warn!("{}; window {} keeps the static reference", err, window.index + 1);
                return Ok(BoundaryOutcome::Skipped(SkipReason::ExtractionFailed(
                    err.to_string(),
                )));
            }
        };

        let outcome = cache.store(window.index, slice)?;

        debug!(
            "Window {} boundary: frames {}..{} cached",
            window.index, self.selection.start, self.selection.end
        );

        Ok(BoundaryOutcome::Extracted {
            evicted: outcome.evicted,
            retried: outcome.replaced,
        })
    }

    fn extract(&self, window: &ContextWindow, denoised: &LatentTensor) -> Result<LatentTensor> {
        let frames = denoised.shape().frames;
        if frames != window.len() {
            return Err(CacheError::Extraction {
                window_index: window.index,
                reason: format!(
                    "latent holds {} frames but window spans {}",
                    frames,
                    window.len()
                ),
            });
        }

        denoised
            .slice_frames(self.selection.start, self.selection.end)
            .map_err(|e| CacheError::Extraction {
                window_index: window.index,
                reason: e.to_string(),
            })
    }
}
