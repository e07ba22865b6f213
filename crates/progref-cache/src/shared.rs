//! Locked cache handle for hosts that process windows concurrently

use crate::{CacheStats, Fetched, Result, StoreOutcome, WindowLatentCache};
use progref_core::LatentTensor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cloneable handle to a [`WindowLatentCache`] behind a mutex.
///
/// Insertion and the evictions it triggers happen under one lock.
#[derive(Debug, Clone)]
pub struct SharedLatentCache {
    inner: Arc<Mutex<WindowLatentCache>>,
}

impl SharedLatentCache {
    pub fn new(cache: WindowLatentCache) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WindowLatentCache> {
        // entries stay consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self, window_index: usize, latent_slice: LatentTensor) -> Result<StoreOutcome> {
        self.lock().store(window_index, latent_slice)
    }

    pub fn fetch(&self, window_index: usize) -> Fetched {
        self.lock().fetch(window_index)
    }

    pub fn clear(&self) {
        self.lock().clear()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    /// Run `f` with exclusive access, e.g. to drive a detector or injector
    pub fn with<R>(&self, f: impl FnOnce(&mut WindowLatentCache) -> R) -> R {
        f(&mut self.lock())
    }
}
