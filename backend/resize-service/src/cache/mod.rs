/// Caching layer for resize-service
///
/// This module handles:
/// - The `ImageCache` contract the orchestrator consumes
/// - A bounded in-process LRU implementation of it
use crate::error::CacheError;
use crate::metrics;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

const DEFAULT_CAPACITY: usize = 1024;

/// Bounded key -> bytes store for resized images.
///
/// `contains` and `get` are independent calls; callers must treat an eviction
/// between them as a plain miss.
pub trait ImageCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Bytes>;

    fn contains(&self, key: &str) -> bool;

    /// Store a payload, returning whether an older entry was evicted
    fn add(&self, key: &str, value: Bytes) -> bool;

    fn shutdown(&self) -> Result<(), CacheError>;
}

/// In-memory LRU cache of resized images
pub struct LruImageCache {
    entries: Mutex<LruCache<String, Bytes>>,
    closed: AtomicBool,
}

impl LruImageCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        info!(capacity = capacity.get(), "Image cache initialized");

        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LruImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ImageCache for LruImageCache {
    fn get(&self, key: &str) -> Option<Bytes> {
        let value = self.entries.lock().get(key).cloned();
        if value.is_some() {
            metrics::record_cache_hit();
        } else {
            metrics::record_cache_miss();
        }
        value
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains(key)
    }

    fn add(&self, key: &str, value: Bytes) -> bool {
        if self.closed.load(Ordering::Acquire) {
            warn!(image_key = %key, "Dropping write to closed image cache");
            return false;
        }

        let mut entries = self.entries.lock();
        match entries.push(key.to_string(), value) {
            Some((evicted_key, _)) => evicted_key != key,
            None => false,
        }
    }

    fn shutdown(&self) -> Result<(), CacheError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(CacheError::Closed);
        }
        info!(entries = self.len(), "Image cache shut down, dropping entries");
        Ok(())
    }
}
