//! Run-scoped buffer policy

use crate::{CacheError, Result};
use progref_core::{LatentShape, WindowGeometry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Window-local frames `[start, end)` copied out of each finished window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: usize,
    pub end: usize,
}

impl SelectionRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of selected frames
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the range lies inside a window of `window_len` frames
    pub fn fits_within(&self, window_len: usize) -> bool {
        !self.is_empty() && self.end <= window_len
    }
}

impl Default for SelectionRange {
    fn default() -> Self {
        Self {
            start: crate::DEFAULT_SELECTION_START,
            end: crate::DEFAULT_SELECTION_END,
        }
    }
}

/// What to do when the selection overlaps frames the next window re-denoises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Accept silently
    Allow,
    /// Accept and log a warning at run start
    #[default]
    Warn,
    /// Refuse to start the run
    Reject,
}

/// Configuration for the window latent buffer, set once per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPolicy {
    /// Feature toggle; when off every window uses the static reference
    pub enabled: bool,
    /// Maximum slices retained at once
    pub max_entries: usize,
    /// Frames extracted from each finished window
    pub selection_range: SelectionRange,
    /// Drop a slice as soon as the next window consumed it
    pub evict_on_fetch: bool,
    /// Handling of selections inside the next window's overlap
    pub overlap_policy: OverlapPolicy,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: crate::DEFAULT_MAX_ENTRIES,
            selection_range: SelectionRange::default(),
            evict_on_fetch: false,
            overlap_policy: OverlapPolicy::default(),
        }
    }
}

impl BufferPolicy {
    /// Policy with the feature switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Parse a policy from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a policy from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Whether the selection covers frames the next window also denoises
    pub fn overlaps_next_window(&self, geometry: &WindowGeometry) -> bool {
        geometry.overlap > 0 && self.selection_range.end > geometry.next_overlap_start()
    }

    /// Shape every stored slice must have, given the run's window latent shape
    pub fn slice_shape(&self, window_shape: LatentShape) -> LatentShape {
        window_shape.with_frames(self.selection_range.len())
    }

    /// Check the policy against the run's window geometry.
    ///
    /// Called once before any compute. The geometry itself must always be
    /// valid; the buffer settings are only checked when the policy is enabled.
    pub fn validate(&self, geometry: &WindowGeometry) -> Result<()> {
        geometry
            .validate()
            .map_err(|e| CacheError::InvalidConfig(e.to_string()))?;

        if !self.enabled {
            return Ok(());
        }

        if self.max_entries == 0 {
            return Err(CacheError::InvalidConfig(
                "max_entries must be at least 1".to_string(),
            ));
        }

        let range = self.selection_range;
        if !range.fits_within(geometry.window_len) {
            return Err(CacheError::InvalidConfig(format!(
                "selection_range {}..{} outside window frames 0..{}",
                range.start, range.end, geometry.window_len
            )));
        }

        if self.overlaps_next_window(geometry) {
            match self.overlap_policy {
                OverlapPolicy::Allow => {}
                OverlapPolicy::Warn => warn!(
                    "selection_range {}..{} overlaps frames {}..{} shared with the next window",
                    range.start,
                    range.end,
                    geometry.next_overlap_start(),
                    geometry.window_len
                ),
                OverlapPolicy::Reject => {
                    return Err(CacheError::InvalidConfig(format!(
                        "selection_range {}..{} overlaps the next window (from frame {})",
                        range.start,
                        range.end,
                        geometry.next_overlap_start()
                    )))
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let policy = BufferPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.max_entries, 1);
        assert_eq!(policy.selection_range, SelectionRange::new(75, 80));
        assert_eq!(policy.selection_range.len(), 5);
        assert!(policy.validate(&WindowGeometry::default()).is_ok());
    }

    #[test]
    fn test_selection_outside_window_is_fatal() {
        let policy = BufferPolicy {
            selection_range: SelectionRange::new(75, 90),
            ..Default::default()
        };
        let err = policy.validate(&WindowGeometry::default()).unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfig(_)));

        let empty = BufferPolicy {
            selection_range: SelectionRange::new(10, 10),
            ..Default::default()
        };
        assert!(empty.validate(&WindowGeometry::default()).is_err());
    }

    #[test]
    fn test_zero_entries_is_fatal() {
        let policy = BufferPolicy {
            max_entries: 0,
            ..Default::default()
        };
        assert!(policy.validate(&WindowGeometry::default()).is_err());
    }

    #[test]
    fn test_disabled_skips_validation() {
        let policy = BufferPolicy {
            selection_range: SelectionRange::new(200, 300),
            max_entries: 0,
            ..BufferPolicy::disabled()
        };
        assert!(policy.validate(&WindowGeometry::default()).is_ok());
    }

    #[test]
    fn test_invalid_geometry_is_fatal() {
        let full_overlap = WindowGeometry {
            window_len: 81,
            overlap: 81,
        };
        let past_end = WindowGeometry {
            window_len: 81,
            overlap: 90,
        };

        for geometry in [full_overlap, past_end] {
            for policy in [BufferPolicy::default(), BufferPolicy::disabled()] {
                assert!(matches!(
                    policy.validate(&geometry),
                    Err(CacheError::InvalidConfig(_))
                ));
            }
        }
    }

    #[test]
    fn test_overlap_policy() {
        let geometry = WindowGeometry::default();
        let mut policy = BufferPolicy::default();
        assert!(policy.overlaps_next_window(&geometry));

        policy.overlap_policy = OverlapPolicy::Reject;
        assert!(policy.validate(&geometry).is_err());

        policy.overlap_policy = OverlapPolicy::Allow;
        assert!(policy.validate(&geometry).is_ok());

        policy.selection_range = SelectionRange::new(40, 45);
        policy.overlap_policy = OverlapPolicy::Reject;
        assert!(!policy.overlaps_next_window(&geometry));
        assert!(policy.validate(&geometry).is_ok());
    }

    #[test]
    fn test_json_partial_fields() {
        let policy = BufferPolicy::from_json_str(
            r#"{
                "max_entries": 2,
                "selection_range": { "start": 70, "end": 80 },
                "overlap_policy": "reject"
            }"#,
        )
        .unwrap();
        assert!(policy.enabled);
        assert_eq!(policy.max_entries, 2);
        assert_eq!(policy.selection_range.len(), 10);
        assert_eq!(policy.overlap_policy, OverlapPolicy::Reject);

        assert!(matches!(
            BufferPolicy::from_json_str("{ not json"),
            Err(CacheError::Json(_))
        ));
    }

    #[test]
    fn test_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "enabled": false }}"#).unwrap();

        let policy = BufferPolicy::from_json_file(file.path()).unwrap();
        assert!(!policy.enabled);
        assert_eq!(policy.max_entries, 1);

        let missing = BufferPolicy::from_json_file(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(CacheError::Io(_))));
    }

    #[test]
    fn test_slice_shape() {
        let policy = BufferPolicy::default();
        let shape = policy.slice_shape(LatentShape::new(16, 81, 60, 104));
        assert_eq!(shape, LatentShape::new(16, 5, 60, 104));
    }
}
