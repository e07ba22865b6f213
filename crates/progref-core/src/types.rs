//! Core type definitions for video latents.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Element type of a latent tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit IEEE float.
    #[default]
    F32,
    /// 16-bit IEEE float.
    F16,
    /// bfloat16.
    BF16,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 | DType::BF16 => 2,
        }
    }

    /// Get dtype name as string.
    pub fn name(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of a video latent: `(channels, frames, height, width)`.
///
/// Data is laid out row-major, so one channel holds `frames` contiguous
/// `height * width` planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LatentShape {
    pub channels: usize,
    pub frames: usize,
    pub height: usize,
    pub width: usize,
}

impl LatentShape {
    pub fn new(channels: usize, frames: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            frames,
            height,
            width,
        }
    }

    /// Build a shape from a rank-4 dimension list.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match *dims {
            [channels, frames, height, width] => Ok(Self::new(channels, frames, height, width)),
            _ => Err(CoreError::invalid_shape(format!(
                "expected rank 4 (channels, frames, height, width), got rank {}",
                dims.len()
            ))),
        }
    }

    /// Dimensions in layout order.
    pub fn dims(&self) -> [usize; 4] {
        [self.channels, self.frames, self.height, self.width]
    }

    /// Same shape with a different frame count.
    pub fn with_frames(&self, frames: usize) -> Self {
        Self { frames, ..*self }
    }

    /// Elements in a single `height * width` plane.
    pub fn plane_elements(&self) -> usize {
        self.height * self.width
    }

    pub fn numel(&self) -> usize {
        self.channels * self.frames * self.plane_elements()
    }

    pub fn size_bytes(&self, dtype: DType) -> usize {
        self.numel() * dtype.size_bytes()
    }

    /// Reject shapes with any zero dimension.
    pub fn validate(&self) -> Result<()> {
        if self.dims().contains(&0) {
            return Err(CoreError::invalid_shape(format!(
                "{} has a zero dimension",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for LatentShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[c:{}, f:{}, h:{}, w:{}]",
            self.channels, self.frames, self.height, self.width
        )
    }
}
