//! Dense latent tensor container.
//!
//! Latents stay as raw bytes tagged with shape and dtype; nothing in this
//! workspace does arithmetic on them, it only moves frame ranges around.

use bytes::{Bytes, BytesMut};

use crate::error::{CoreError, Result};
use crate::types::{DType, LatentShape};

/// A `(channels, frames, height, width)` latent held as raw bytes.
///
/// Cloning is cheap: the buffer is reference counted and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatentTensor {
    data: Bytes,
    shape: LatentShape,
    dtype: DType,
}

impl LatentTensor {
    /// Wrap a raw buffer, checking it matches `shape` and `dtype`.
    pub fn new(data: Bytes, shape: LatentShape, dtype: DType) -> Result<Self> {
        shape.validate()?;

        let expected = shape.size_bytes(dtype);
        if data.len() != expected {
            return Err(CoreError::SizeMismatch {
                shape,
                dtype,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self { data, shape, dtype })
    }

    /// Build an f32 tensor from host values (little-endian).
    pub fn from_f32(values: &[f32], shape: LatentShape) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(values.len() * DType::F32.size_bytes());
        for v in values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Self::new(buf.freeze(), shape, DType::F32)
    }

    /// All-zero tensor.
    pub fn zeros(shape: LatentShape, dtype: DType) -> Result<Self> {
        shape.validate()?;
        let data = Bytes::from(vec![0u8; shape.size_bytes(dtype)]);
        Ok(Self { data, shape, dtype })
    }

    pub fn shape(&self) -> LatentShape {
        self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// Decode the buffer back into f32 values.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        if self.dtype != DType::F32 {
            return Err(CoreError::DTypeMismatch {
                expected: DType::F32,
                actual: self.dtype,
            });
        }

        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Copy frames `[start, end)` into a new tensor.
    ///
    /// The result owns a fresh buffer; `self` is neither aliased nor mutated.
    pub fn slice_frames(&self, start: usize, end: usize) -> Result<Self> {
        let frames = self.shape.frames;
        if start >= end || end > frames {
            return Err(CoreError::FrameRange { start, end, frames });
        }

        let frame_bytes = self.shape.plane_elements() * self.dtype.size_bytes();
        let channel_stride = frames * frame_bytes;
        let out_shape = self.shape.with_frames(end - start);

        let mut out = BytesMut::with_capacity(out_shape.size_bytes(self.dtype));
        for c in 0..self.shape.channels {
            let base = c * channel_stride;
            out.extend_from_slice(&self.data[base + start * frame_bytes..base + end * frame_bytes]);
        }

        Ok(Self {
            data: out.freeze(),
            shape: out_shape,
            dtype: self.dtype,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(shape: LatentShape) -> LatentTensor {
        let values: Vec<f32> = (0..shape.numel()).map(|i| i as f32).collect();
        LatentTensor::from_f32(&values, shape).unwrap()
    }

    #[test]
    fn test_size_validation() {
        let shape = LatentShape::new(2, 3, 4, 4);
        let err = LatentTensor::new(Bytes::from(vec![0u8; 10]), shape, DType::F16).unwrap_err();
        assert!(matches!(err, CoreError::SizeMismatch { expected: 192, actual: 10, .. }));

        let ok = LatentTensor::new(Bytes::from(vec![0u8; 192]), shape, DType::F16).unwrap();
        assert_eq!(ok.size_bytes(), 192);
    }

    #[test]
    fn test_slice_frames_picks_each_channel() {
        // 2 channels, 4 frames of 1x2
        let t = ramp(LatentShape::new(2, 4, 1, 2));
        let s = t.slice_frames(1, 3).unwrap();

        assert_eq!(s.shape(), LatentShape::new(2, 2, 1, 2));
        // channel 0 frames 1..3 = elements 2..6, channel 1 frames 1..3 = 10..14
        assert_eq!(
            s.to_f32_vec().unwrap(),
            vec![2.0, 3.0, 4.0, 5.0, 10.0, 11.0, 12.0, 13.0]
        );
    }

    #[test]
    fn test_slice_frames_copies() {
        let t = ramp(LatentShape::new(1, 4, 2, 2));
        let before = t.as_bytes().to_vec();
        let s = t.slice_frames(2, 4).unwrap();

        assert_ne!(s.as_bytes().as_ptr(), t.as_bytes()[8 * 4..].as_ptr());
        assert_eq!(t.as_bytes(), before.as_slice());
    }

    #[test]
    fn test_slice_frames_out_of_range() {
        let t = ramp(LatentShape::new(1, 4, 2, 2));
        assert_eq!(
            t.slice_frames(3, 6).unwrap_err(),
            CoreError::FrameRange {
                start: 3,
                end: 6,
                frames: 4
            }
        );
        assert!(t.slice_frames(2, 2).is_err());
    }

    #[test]
    fn test_to_f32_requires_f32() {
        let t = LatentTensor::zeros(LatentShape::new(1, 1, 2, 2), DType::BF16).unwrap();
        assert!(t.to_f32_vec().is_err());
    }
}
