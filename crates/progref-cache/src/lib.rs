//! Progressive Reference Caching for Windowed Video Diffusion
//!
//! Long clips are denoised in overlapping context windows, each conditioned
//! on a static reference image. This crate lets each window condition on the
//! latents the previous window just produced instead:
//! - Extract a frame sub-range when a window finishes denoising
//! - Keep a bounded set of those slices keyed by window index
//! - Hand the preceding window's slice to the next window's attention input
//!
//! # Key Insight
//!
//! The tail frames of window `i` are the closest appearance anchor for window
//! `i + 1`. Anything that goes wrong along the way only costs the window its
//! progressive reference: it falls back to the static one and the run goes on.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Progressive Reference                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  Sampler ──> BoundaryDetector ──> WindowLatentCache.store    │
//! │  (window i done)   frames 75..80         │                   │
//! │                                          ↓                   │
//! │  Sampler ──> ReferenceInjector ──> WindowLatentCache.fetch   │
//! │  (window i+1 start)     │                                    │
//! │                         ↓                                    │
//! │         Progressive(slice of i) | Static                     │
//! │                         │                                    │
//! │                         ↓                                    │
//! │                 attention conditioning                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod cache;
mod detector;
mod error;
mod injector;
mod policy;
mod session;
mod shared;
mod tracker;

pub use cache::{CacheEntry, CacheStats, Fetched, StoreOutcome, WindowLatentCache};
pub use detector::{BoundaryDetector, BoundaryOutcome, SkipReason};
pub use error::{CacheError, Result};
pub use injector::{Conditioning, InjectorStats, ReferenceContract, ReferenceInjector};
pub use policy::{BufferPolicy, OverlapPolicy, SelectionRange};
pub use session::{ProgressiveReference, RunConfig, RunStats};
pub use shared::SharedLatentCache;
pub use tracker::{WindowPhase, WindowTracker};

/// Default number of retained slices
pub const DEFAULT_MAX_ENTRIES: usize = 1;

/// Default first selected frame
pub const DEFAULT_SELECTION_START: usize = 75;

/// Default end of the selected frames (exclusive)
pub const DEFAULT_SELECTION_END: usize = 80;

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        BufferPolicy, Conditioning, ProgressiveReference, ReferenceContract, Result, RunConfig,
        WindowLatentCache,
    };
    pub use progref_core::{ContextWindow, DType, LatentShape, LatentTensor, WindowGeometry};
}
