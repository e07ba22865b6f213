//! Sliding context windows over the frame axis.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Window length and overlap shared by every window of a run.
///
/// Deserialization goes through [`WindowGeometry::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawGeometry")]
pub struct WindowGeometry {
    /// Frames per window.
    pub window_len: usize,
    /// Frames shared by consecutive windows.
    pub overlap: usize,
}

impl WindowGeometry {
    pub fn new(window_len: usize, overlap: usize) -> Result<Self> {
        if window_len == 0 {
            return Err(CoreError::invalid_window("window length must be > 0"));
        }
        if overlap >= window_len {
            return Err(CoreError::invalid_window(format!(
                "overlap {} must be smaller than window length {}",
                overlap, window_len
            )));
        }
        Ok(Self {
            window_len,
            overlap,
        })
    }

    /// Re-check a geometry built from its public fields.
    pub fn validate(&self) -> Result<()> {
        Self::new(self.window_len, self.overlap).map(|_| ())
    }

    /// Frames a window advances past its predecessor.
    pub fn stride(&self) -> usize {
        self.window_len.saturating_sub(self.overlap)
    }

    /// First window-local frame that the next window also covers.
    pub fn next_overlap_start(&self) -> usize {
        self.stride()
    }
}

impl Default for WindowGeometry {
    fn default() -> Self {
        Self {
            window_len: crate::DEFAULT_WINDOW_LEN,
            overlap: crate::DEFAULT_WINDOW_OVERLAP,
        }
    }
}

#[derive(Deserialize)]
struct RawGeometry {
    window_len: usize,
    overlap: usize,
}

impl TryFrom<RawGeometry> for WindowGeometry {
    type Error = CoreError;

    fn try_from(raw: RawGeometry) -> Result<Self> {
        Self::new(raw.window_len, raw.overlap)
    }
}

/// A contiguous frame range denoised in one pass.
///
/// Deserialization goes through [`ContextWindow::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct ContextWindow {
    pub index: usize,
    pub frame_start: usize,
    /// Exclusive.
    pub frame_end: usize,
    pub overlap_with_previous: usize,
}

impl ContextWindow {
    pub fn new(
        index: usize,
        frame_start: usize,
        frame_end: usize,
        overlap_with_previous: usize,
    ) -> Result<Self> {
        if frame_end <= frame_start {
            return Err(CoreError::invalid_window(format!(
                "window {} has empty frame range {}..{}",
                index, frame_start, frame_end
            )));
        }
        if overlap_with_previous > frame_end - frame_start {
            return Err(CoreError::invalid_window(format!(
                "window {} overlap {} exceeds its length {}",
                index,
                overlap_with_previous,
                frame_end - frame_start
            )));
        }
        Ok(Self {
            index,
            frame_start,
            frame_end,
            overlap_with_previous,
        })
    }

    /// Split `total_frames` into overlapping windows, in processing order.
    ///
    /// The last window is clamped to `total_frames` and may be shorter.
    pub fn schedule(total_frames: usize, geometry: WindowGeometry) -> Result<Vec<ContextWindow>> {
        if total_frames == 0 {
            return Err(CoreError::invalid_window("no frames to schedule"));
        }
        let geometry = WindowGeometry::new(geometry.window_len, geometry.overlap)?;

        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + geometry.window_len).min(total_frames);
            let overlap = if windows.is_empty() { 0 } else { geometry.overlap };
            windows.push(ContextWindow {
                index: windows.len(),
                frame_start: start,
                frame_end: end,
                overlap_with_previous: overlap,
            });
            if end == total_frames {
                break;
            }
            start += geometry.stride();
        }

        Ok(windows)
    }

    /// Frames covered; zero for an inverted range.
    pub fn len(&self) -> usize {
        self.frame_end.saturating_sub(self.frame_start)
    }

    pub fn is_empty(&self) -> bool {
        self.frame_end <= self.frame_start
    }

    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    /// Map a global frame index into this window, if covered.
    pub fn local_frame(&self, global: usize) -> Option<usize> {
        (self.frame_start..self.frame_end)
            .contains(&global)
            .then(|| global - self.frame_start)
    }
}

#[derive(Deserialize)]
struct RawWindow {
    index: usize,
    frame_start: usize,
    frame_end: usize,
    overlap_with_previous: usize,
}

impl TryFrom<RawWindow> for ContextWindow {
    type Error = CoreError;

    fn try_from(raw: RawWindow) -> Result<Self> {
        Self::new(
            raw.index,
            raw.frame_start,
            raw.frame_end,
            raw.overlap_with_previous,
        )
    }
}
