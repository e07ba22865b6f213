//! Bounded per-window latent cache

use crate::{BufferPolicy, CacheError, Result};
use progref_core::{DType, LatentShape, LatentTensor};
use std::collections::HashMap;
use tracing::debug;

/// A slice retained for one completed window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Window the slice was extracted from
    pub window_index: usize,
    /// Extracted latent frames
    pub latent_slice: LatentTensor,
    /// Store counter at insertion; orders eviction
    pub created_at_step: u64,
}

/// Result of a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    /// The preceding window's slice
    Progressive(CacheEntry),
    /// No progressive reference; use the static one
    UseStaticReference,
}

impl Fetched {
    pub fn is_progressive(&self) -> bool {
        matches!(self, Fetched::Progressive(_))
    }

    pub fn into_entry(self) -> Option<CacheEntry> {
        match self {
            Fetched::Progressive(entry) => Some(entry),
            Fetched::UseStaticReference => None,
        }
    }
}

/// What a store did to the cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOutcome {
    /// An entry for the same window was overwritten
    pub replaced: bool,
    /// Windows whose slices were evicted, oldest first
    pub evicted: Vec<usize>,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Successful stores
    pub stores: u64,
    /// Stores that overwrote an existing window
    pub replacements: u64,
    /// Stores refused for shape or dtype
    pub rejected: u64,
    /// Entries evicted
    pub evictions: u64,
    /// Fetch calls
    pub lookups: u64,
    /// Fetches that found the preceding window
    pub hits: u64,
    /// Fetches that fell back to the static reference
    pub misses: u64,
    /// Entries currently held
    pub entries: usize,
    /// Bytes currently held
    pub retained_bytes: usize,
}

impl CacheStats {
    /// Hit rate
    pub fn hit_rate(&self) -> f32 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f32 / self.lookups as f32
        }
    }
}

/// Latent slices keyed by window index.
///
/// Holds at most `max_entries` slices, evicting the oldest store first.
/// Access is expected to be sequential; see [`crate::SharedLatentCache`]
/// for a locked wrapper.
#[derive(Debug)]
pub struct WindowLatentCache {
    max_entries: usize,
    evict_on_fetch: bool,
    slice_shape: LatentShape,
    dtype: DType,
    entries: HashMap<usize, CacheEntry>,
    next_step: u64,
    stats: CacheStats,
}

impl WindowLatentCache {
    /// Create a cache accepting slices of `slice_shape` and `dtype`.
    ///
    /// A disabled policy is not checked; its cache never receives slices.
    pub fn new(policy: &BufferPolicy, slice_shape: LatentShape, dtype: DType) -> Result<Self> {
        if policy.enabled {
            if policy.max_entries == 0 {
                return Err(CacheError::InvalidConfig(
                    "max_entries must be at least 1".to_string(),
                ));
            }
            slice_shape.validate()?;
            if slice_shape.frames != policy.selection_range.len() {
                return Err(CacheError::InvalidConfig(format!(
                    "slice shape {} does not hold the {} selected frames",
                    slice_shape,
                    policy.selection_range.len()
                )));
            }
        }

        let max_entries = policy.max_entries.max(1);
        Ok(Self {
            max_entries,
            evict_on_fetch: policy.evict_on_fetch,
            slice_shape,
            dtype,
            entries: HashMap::with_capacity(max_entries + 1),
            next_step: 0,
            stats: CacheStats::default(),
        })
    }

    /// Insert or replace the slice for `window_index`.
    ///
    /// A slice of the wrong shape or dtype is refused and leaves the cache
    /// untouched.
    pub fn store(
        &mut self,
        window_index: usize,
        latent_slice: LatentTensor,
    ) -> Result<StoreOutcome> {
        if latent_slice.shape() != self.slice_shape || latent_slice.dtype() != self.dtype {
            self.stats.rejected += 1;
            return Err(CacheError::InvalidSlice {
                window_index,
                expected: self.slice_shape,
                expected_dtype: self.dtype,
                actual: latent_slice.shape(),
                actual_dtype: latent_slice.dtype(),
            });
        }

        let created_at_step = self.next_step;
        self.next_step += 1;

        let size = latent_slice.size_bytes();
        let replaced = self
            .entries
            .insert(
                window_index,
                CacheEntry {
                    window_index,
                    latent_slice,
                    created_at_step,
                },
            )
            .is_some();

        let mut outcome = StoreOutcome {
            replaced,
            evicted: Vec::new(),
        };

        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .values()
                .min_by_key(|e| e.created_at_step)
                .map(|e| e.window_index);

            match oldest {
                Some(index) => {
                    self.entries.remove(&index);
                    outcome.evicted.push(index);
                }
                None => break,
            }
        }

        self.stats.stores += 1;
        if replaced {
            self.stats.replacements += 1;
        }
        self.stats.evictions += outcome.evicted.len() as u64;

        debug!(
            "Stored window {} slice ({} bytes, replaced={}, evicted={:?})",
            window_index, size, replaced, outcome.evicted
        );

        Ok(outcome)
    }

    /// Slice stored for the window preceding `window_index`, if any
    pub fn fetch(&mut self, window_index: usize) -> Fetched {
        self.stats.lookups += 1;

        let found = window_index.checked_sub(1).and_then(|prev| {
            if self.evict_on_fetch {
                self.entries.remove(&prev)
            } else {
                self.entries.get(&prev).cloned()
            }
        });

        match found {
            Some(entry) => {
                self.stats.hits += 1;
                debug!(
                    "Window {} fetched slice of window {}",
                    window_index, entry.window_index
                );
                Fetched::Progressive(entry)
            }
            None => {
                self.stats.misses += 1;
                debug!("Window {} has no progressive reference", window_index);
                Fetched::UseStaticReference
            }
        }
    }

    /// Drop every retained slice
    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        if dropped > 0 {
            debug!("Cleared {} cached window slices", dropped);
        }
    }

    /// Check if a window has a retained slice
    pub fn contains(&self, window_index: usize) -> bool {
        self.entries.contains_key(&window_index)
    }

    /// Retained window indices, ascending
    pub fn window_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.entries.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn slice_shape(&self) -> LatentShape {
        self.slice_shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Bytes held by retained slices
    pub fn retained_bytes(&self) -> usize {
        self.entries
            .values()
            .map(|e| e.latent_slice.size_bytes())
            .sum()
    }

    /// Upper bound on retained bytes: `max_entries * slice size`
    pub fn memory_bound_bytes(&self) -> usize {
        self.max_entries * self.slice_shape.size_bytes(self.dtype)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            retained_bytes: self.retained_bytes(),
            ..self.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SelectionRange;

    fn shape() -> LatentShape {
        LatentShape::new(4, 5, 2, 2)
    }

    fn slice(fill: f32) -> LatentTensor {
        LatentTensor::from_f32(&vec![fill; shape().numel()], shape()).unwrap()
    }

    fn cache(max_entries: usize) -> WindowLatentCache {
        let policy = BufferPolicy {
            max_entries,
            ..Default::default()
        };
        WindowLatentCache::new(&policy, shape(), DType::F32).unwrap()
    }

    #[test]
    fn test_store_and_fetch_previous() {
        let mut cache = cache(1);
        let s0 = slice(1.0);

        cache.store(0, s0.clone()).unwrap();

        let entry = cache.fetch(1).into_entry().unwrap();
        assert_eq!(entry.window_index, 0);
        assert_eq!(entry.latent_slice.as_bytes(), s0.as_bytes());

        // the entry is still there for a retried window
        assert!(cache.fetch(1).is_progressive());
    }

    #[test]
    fn test_first_window_uses_static() {
        let mut cache = cache(1);
        assert_eq!(cache.fetch(0), Fetched::UseStaticReference);
        assert_eq!(cache.fetch(5), Fetched::UseStaticReference);

        let stats = cache.stats();
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_store_replaces_same_window() {
        let mut cache = cache(2);
        cache.store(3, slice(1.0)).unwrap();
        let outcome = cache.store(3, slice(2.0)).unwrap();

        assert!(outcome.replaced);
        assert!(outcome.evicted.is_empty());
        assert_eq!(cache.len(), 1);

        let entry = cache.fetch(4).into_entry().unwrap();
        assert_eq!(entry.latent_slice, slice(2.0));
        assert_eq!(entry.created_at_step, 1);
    }

    #[test]
    fn test_oldest_evicted_first() {
        let mut cache = cache(2);
        cache.store(0, slice(0.0)).unwrap();
        cache.store(1, slice(1.0)).unwrap();
        let outcome = cache.store(2, slice(2.0)).unwrap();

        assert_eq!(outcome.evicted, vec![0]);
        assert_eq!(cache.window_indices(), vec![1, 2]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_eviction_follows_store_order_not_index() {
        let mut cache = cache(2);
        cache.store(5, slice(0.0)).unwrap();
        cache.store(2, slice(1.0)).unwrap();
        // refreshing 5 makes 2 the oldest
        cache.store(5, slice(2.0)).unwrap();
        let outcome = cache.store(7, slice(3.0)).unwrap();

        assert_eq!(outcome.evicted, vec![2]);
        assert_eq!(cache.window_indices(), vec![5, 7]);
    }

    #[test]
    fn test_wrong_shape_rejected() {
        let mut cache = cache(1);
        cache.store(0, slice(1.0)).unwrap();

        let bad_shape = LatentShape::new(4, 6, 2, 2);
        let bad = LatentTensor::zeros(bad_shape, DType::F32).unwrap();
        let err = cache.store(0, bad).unwrap_err();
        assert!(matches!(err, CacheError::InvalidSlice { window_index: 0, .. }));

        let bad_dtype = LatentTensor::zeros(shape(), DType::F16).unwrap();
        assert!(cache.store(0, bad_dtype).is_err());

        // original entry untouched
        assert_eq!(cache.fetch(1).into_entry().unwrap().latent_slice, slice(1.0));
        assert_eq!(cache.stats().rejected, 2);
    }

    #[test]
    fn test_clear() {
        let mut cache = cache(3);
        for i in 0..3 {
            cache.store(i, slice(i as f32)).unwrap();
        }
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.retained_bytes(), 0);
        for i in 0..5 {
            assert_eq!(cache.fetch(i), Fetched::UseStaticReference);
        }
    }

    #[test]
    fn test_evict_on_fetch() {
        let policy = BufferPolicy {
            evict_on_fetch: true,
            ..Default::default()
        };
        let mut cache = WindowLatentCache::new(&policy, shape(), DType::F32).unwrap();
        cache.store(0, slice(1.0)).unwrap();

        assert!(cache.fetch(1).is_progressive());
        assert!(cache.is_empty());
        assert_eq!(cache.fetch(1), Fetched::UseStaticReference);
    }

    #[test]
    fn test_memory_bound() {
        let mut cache = cache(2);
        let slice_bytes = shape().size_bytes(DType::F32);
        assert_eq!(cache.memory_bound_bytes(), 2 * slice_bytes);

        for i in 0..10 {
            cache.store(i, slice(i as f32)).unwrap();
            assert!(cache.retained_bytes() <= cache.memory_bound_bytes());
        }
        assert_eq!(cache.stats().retained_bytes, 2 * slice_bytes);
    }

    #[test]
    fn test_new_checks_policy() {
        let zero = BufferPolicy {
            max_entries: 0,
            ..Default::default()
        };
        assert!(WindowLatentCache::new(&zero, shape(), DType::F32).is_err());

        let wide = BufferPolicy {
            selection_range: SelectionRange::new(70, 80),
            ..Default::default()
        };
        assert!(WindowLatentCache::new(&wide, shape(), DType::F32).is_err());
    }
}
