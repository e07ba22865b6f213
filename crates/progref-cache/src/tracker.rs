//! Per-window progress through the reference hand-off

use crate::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a window is in the hand-off.
///
/// Phases only move forward: `AwaitingBoundary -> Extracted -> InjectedOrSkipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WindowPhase {
    /// Still denoising
    AwaitingBoundary,
    /// Slice extracted and cached
    Extracted,
    /// Slice consumed by the next window, or never produced
    InjectedOrSkipped,
}

/// Phase of every window seen in a run
#[derive(Debug, Clone, Default)]
pub struct WindowTracker {
    phases: BTreeMap<usize, WindowPhase>,
}

impl WindowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase; unseen windows are awaiting their boundary
    pub fn phase(&self, window_index: usize) -> WindowPhase {
        self.phases
            .get(&window_index)
            .copied()
            .unwrap_or(WindowPhase::AwaitingBoundary)
    }

    /// Move a window to `to`. Staying in place is allowed (retries).
    pub fn advance(&mut self, window_index: usize, to: WindowPhase) -> Result<()> {
        let from = self.phase(window_index);
        if to < from {
            return Err(CacheError::PhaseRegression {
                window_index,
                from,
                to,
            });
        }
        self.phases.insert(window_index, to);
        Ok(())
    }

    /// Windows currently in `phase`
    pub fn windows_in(&self, phase: WindowPhase) -> Vec<usize> {
        self.phases
            .iter()
            .filter(|(_, p)| **p == phase)
            .map(|(i, _)| *i)
            .collect()
    }

    pub fn clear(&mut self) {
        self.phases.clear();
    }
}
