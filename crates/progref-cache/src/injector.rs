//! Reference conditioning selection

use crate::{BufferPolicy, CacheError, Fetched, Result, WindowLatentCache};
use progref_core::{ContextWindow, DType, LatentShape, LatentTensor};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Reference input the attention module accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceContract {
    pub shape: LatentShape,
    pub dtype: DType,
}

impl ReferenceContract {
    pub fn new(shape: LatentShape, dtype: DType) -> Self {
        Self { shape, dtype }
    }

    /// Check a candidate reference against the contract
    pub fn check(&self, tensor: &LatentTensor) -> Result<()> {
        if tensor.shape() != self.shape || tensor.dtype() != self.dtype {
            return Err(CacheError::ShapeMismatch {
                expected: self.shape,
                expected_dtype: self.dtype,
                actual: tensor.shape(),
                actual_dtype: tensor.dtype(),
            });
        }
        Ok(())
    }
}

/// Reference conditioning chosen for one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conditioning {
    /// Use the host's original reference image latent
    Static,
    /// Use the preceding window's latents instead
    Progressive {
        tensor: LatentTensor,
        source_window: usize,
    },
}

impl Conditioning {
    pub fn is_progressive(&self) -> bool {
        matches!(self, Conditioning::Progressive { .. })
    }

    pub fn tensor(&self) -> Option<&LatentTensor> {
        match self {
            Conditioning::Progressive { tensor, .. } => Some(tensor),
            Conditioning::Static => None,
        }
    }
}

/// Injection statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InjectorStats {
    /// Windows given a progressive reference
    pub progressive: u64,
    /// Windows left on the static reference
    pub static_reference: u64,
    /// Cached slices refused by the contract
    pub shape_mismatches: u64,
}

/// Picks the reference conditioning at the start of each window
#[derive(Debug, Clone)]
pub struct ReferenceInjector {
    enabled: bool,
    contract: ReferenceContract,
    stats: InjectorStats,
}

impl ReferenceInjector {
    pub fn new(policy: &BufferPolicy, contract: ReferenceContract) -> Self {
        Self {
            enabled: policy.enabled,
            contract,
            stats: InjectorStats::default(),
        }
    }

    pub fn contract(&self) -> &ReferenceContract {
        &self.contract
    }

    pub fn stats(&self) -> InjectorStats {
        self.stats
    }

    /// Reference conditioning for `window`.
    ///
    /// When disabled the cache is never consulted. A cached slice that does
    /// not satisfy the contract is dropped with a warning and the window keeps
    /// the static reference.
    pub fn conditioning_for(
        &mut self,
        window: &ContextWindow,
        cache: &mut WindowLatentCache,
    ) -> Conditioning {
        if !self.enabled {
            self.stats.static_reference += 1;
            return Conditioning::Static;
        }

        let entry = match cache.fetch(window.index) {
            Fetched::Progressive(entry) => entry,
            Fetched::UseStaticReference => {
                self.stats.static_reference += 1;
                return Conditioning::Static;
            }
        };

        if let Err(err) = self.contract.check(&entry.latent_slice) {
            warn!(
                "{}; window {} falls back to the static reference",
                err, window.index
            );
            self.stats.shape_mismatches += 1;
            self.stats.static_reference += 1;
            return Conditioning::Static;
        }

        debug!(
            "Window {} conditioned on window {}",
            window.index, entry.window_index
        );
        self.stats.progressive += 1;

        Conditioning::Progressive {
            tensor: entry.latent_slice,
            source_window: entry.window_index,
        }
    }
}
