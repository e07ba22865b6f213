//! Run-scoped progressive reference session

use crate::{
    BoundaryDetector, BoundaryOutcome, BufferPolicy, CacheStats, Conditioning, InjectorStats,
    ReferenceContract, ReferenceInjector, Result, WindowLatentCache, WindowPhase, WindowTracker,
};
use progref_core::{ContextWindow, DType, LatentShape, LatentTensor, WindowGeometry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Everything fixed for one generation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Buffer policy
    pub policy: BufferPolicy,
    /// Window length and overlap
    pub geometry: WindowGeometry,
    /// Latent channels
    pub channels: usize,
    /// Latent height
    pub height: usize,
    /// Latent width
    pub width: usize,
    /// Latent element type
    pub dtype: DType,
}

impl RunConfig {
    /// Shape of a full window's latents
    pub fn window_shape(&self) -> LatentShape {
        LatentShape::new(self.channels, self.geometry.window_len, self.height, self.width)
    }

    /// Shape of each cached slice
    pub fn slice_shape(&self) -> LatentShape {
        self.policy.slice_shape(self.window_shape())
    }
}

/// Statistics for a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Cache counters
    pub cache: CacheStats,
    /// Injection counters
    pub injector: InjectorStats,
    /// Windows whose extraction degraded
    pub skipped_windows: u64,
}

/// One generation run's cache, detector, and injector.
///
/// The host calls [`reference_for`](Self::reference_for) before each window's
/// attention pass and [`complete_window`](Self::complete_window) once its
/// latents are final. Retained slices are released by
/// [`finish`](Self::finish), or on drop if the run is abandoned.
#[derive(Debug)]
pub struct ProgressiveReference {
    config: RunConfig,
    cache: WindowLatentCache,
    detector: BoundaryDetector,
    injector: ReferenceInjector,
    tracker: WindowTracker,
    skipped_windows: u64,
}

impl ProgressiveReference {
    /// Validate the configuration and start a run
    pub fn begin(config: RunConfig, contract: ReferenceContract) -> Result<Self> {
        config.policy.validate(&config.geometry)?;

        let cache = WindowLatentCache::new(&config.policy, config.slice_shape(), config.dtype)?;
        let detector = BoundaryDetector::new(&config.policy);
        let injector = ReferenceInjector::new(&config.policy, contract);

        info!(
            "Progressive reference run started (enabled={}, slice={}, max_entries={})",
            config.policy.enabled,
            config.slice_shape(),
            config.policy.max_entries
        );

        Ok(Self {
            config,
            cache,
            detector,
            injector,
            tracker: WindowTracker::new(),
            skipped_windows: 0,
        })
    }

    /// Reference conditioning for the window about to be denoised
    pub fn reference_for(&mut self, window: &ContextWindow) -> Result<Conditioning> {
        let conditioning = self.injector.conditioning_for(window, &mut self.cache);

        if let Some(prev) = window.index.checked_sub(1) {
            if self.tracker.phase(prev) == WindowPhase::Extracted {
                self.tracker.advance(prev, WindowPhase::InjectedOrSkipped)?;
            }
        }

        Ok(conditioning)
    }

    /// Hand over a window's final latents
    pub fn complete_window(
        &mut self,
        window: &ContextWindow,
        denoised: &LatentTensor,
    ) -> Result<BoundaryOutcome> {
        let phase = self.tracker.phase(window.index);
        if phase == WindowPhase::InjectedOrSkipped {
            return Err(crate::CacheError::PhaseRegression {
                window_index: window.index,
                from: phase,
                to: WindowPhase::Extracted,
            });
        }

        let outcome = self
            .detector
            .on_window_complete(window, denoised, &mut self.cache)?;

        let next = match &outcome {
            BoundaryOutcome::Extracted { .. } => WindowPhase::Extracted,
            BoundaryOutcome::Skipped(reason) => {
                if matches!(reason, crate::SkipReason::ExtractionFailed(_)) {
                    self.skipped_windows += 1;
                }
                WindowPhase::InjectedOrSkipped
            }
        };
        self.tracker.advance(window.index, next)?;

        Ok(outcome)
    }

    /// Phase of a window
    pub fn phase(&self, window_index: usize) -> WindowPhase {
        self.tracker.phase(window_index)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn cache(&self) -> &WindowLatentCache {
        &self.cache
    }

    /// Get run statistics
    pub fn stats(&self) -> RunStats {
        RunStats {
            cache: self.cache.stats(),
            injector: self.injector.stats(),
            skipped_windows: self.skipped_windows,
        }
    }

    /// End the run and release retained slices.
    ///
    /// Counters cover the whole run; `entries` and `retained_bytes` reflect
    /// the cache after release.
    pub fn finish(mut self) -> RunStats {
        self.release();
        let stats = self.stats();
        info!(
            "Progressive reference run finished: {} progressive, {} static, {} skipped",
            stats.injector.progressive, stats.injector.static_reference, stats.skipped_windows
        );
        stats
    }

    /// Abandon the run, e.g. on cancellation
    pub fn cancel(mut self) -> RunStats {
        warn!(
            "Progressive reference run cancelled with {} slices retained",
            self.cache.len()
        );
        self.release();
        self.stats()
    }

    fn release(&mut self) {
        self.cache.clear();
        self.tracker.clear();
    }
}

impl Drop for ProgressiveReference {
    fn drop(&mut self) {
        if !self.cache.is_empty() {
            debug!("Releasing {} slices of an unfinished run", self.cache.len());
        }
        self.release();
    }
}
