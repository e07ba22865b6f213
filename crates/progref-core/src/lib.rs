//! # Progref Core
//!
//! Shared vocabulary for progressive-reference conditioning of windowed
//! video diffusion.
//!
//! A long clip is denoised as a sequence of overlapping context windows.
//! This crate describes those windows and the latent tensors that flow
//! between them; the caching logic lives in `progref-cache`.
//!
//! ## Types
//!
//! - [`LatentTensor`] - `(channels, frames, height, width)` latent over raw bytes
//! - [`LatentShape`] / [`DType`] - shape and element type tags
//! - [`ContextWindow`] - one frame range denoised in a single pass
//! - [`WindowGeometry`] - window length and overlap for a run
//!
//! ## Example
//!
//! ```ignore
//! use progref_core::{ContextWindow, WindowGeometry};
//!
//! let windows = ContextWindow::schedule(180, WindowGeometry::default())?;
//! assert_eq!(windows.len(), 4);
//! ```

pub mod error;
pub mod tensor;
pub mod types;
pub mod window;

pub use error::{CoreError, Result};
pub use tensor::LatentTensor;
pub use types::{DType, LatentShape};
pub use window::{ContextWindow, WindowGeometry};

/// Frames per context window in the reference setup.
pub const DEFAULT_WINDOW_LEN: usize = 81;

/// Frames shared by consecutive windows in the reference setup.
pub const DEFAULT_WINDOW_OVERLAP: usize = 32;
