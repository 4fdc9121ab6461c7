//! In-memory LRU image cache with a cost budget.

use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use crate::domain::entities::{CacheKey, CachedImage};
use crate::domain::ports::ImageCachePort;

/// Default aggregate cost budget (100 MB).
pub const DEFAULT_MEMORY_BUDGET: u64 = 100 * 1024 * 1024;

/// An entry pushed out of the memory tier.
#[derive(Debug, Clone)]
pub struct EvictedImage {
    /// Key of the evicted entry.
    pub key: CacheKey,
    /// The evicted payload.
    pub image: CachedImage,
}

struct Entry {
    image: CachedImage,
    cost: u64,
}

struct Inner {
    entries: LruCache<CacheKey, Entry>,
    total_cost: u64,
}

/// In-memory LRU cache for decoded images, bounded by estimated byte cost.
///
/// Evictions are reported on an optional bounded channel so the disk tier can
/// keep the payload. Sending never blocks: when the channel is full the event
/// is dropped.
pub struct MemoryImageCache {
    inner: Mutex<Inner>,
    budget: u64,
    eviction_tx: Option<mpsc::Sender<EvictedImage>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache with the given cost budget in bytes.
    #[must_use]
    pub fn new(budget: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_cost: 0,
            }),
            budget,
            eviction_tx: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default budget.
    #[must_use]
    pub fn with_default_budget() -> Self {
        Self::new(DEFAULT_MEMORY_BUDGET)
    }

    /// Routes eviction events to `tx`.
    #[must_use]
    pub fn with_eviction_sink(mut self, tx: mpsc::Sender<EvictedImage>) -> Self {
        self.eviction_tx = Some(tx);
        self
    }

    /// Returns the configured budget in bytes.
    #[must_use]
    pub const fn budget(&self) -> u64 {
        self.budget
    }

    /// Returns the summed cost of all entries.
    #[must_use]
    pub fn total_cost(&self) -> u64 {
        self.inner.lock().total_cost
    }

    /// Peeks at an image without promoting it in the LRU.
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<CachedImage> {
        self.inner.lock().entries.peek(key).map(|e| e.image.clone())
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let inner = self.inner.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: inner.entries.len(),
            total_cost: inner.total_cost,
            budget: self.budget,
        }
    }

    fn emit(&self, evicted: EvictedImage) {
        let Some(tx) = &self.eviction_tx else {
            return;
        };
        match tx.try_send(evicted) {
            Ok(()) => {}
            Err(TrySendError::Full(evicted)) => {
                warn!(key = %evicted.key, "Eviction queue full, dropping evicted image");
            }
            Err(TrySendError::Closed(evicted)) => {
                debug!(key = %evicted.key, "Eviction queue closed");
            }
        }
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_default_budget()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Summed cost of cached images in bytes.
    pub total_cost: u64,
    /// Cost budget in bytes.
    pub budget: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {}/{} bytes, {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.total_cost, self.budget, self.hit_rate, self.hits, self.misses
        )
    }
}

impl ImageCachePort for MemoryImageCache {
    fn get(&self, key: &CacheKey) -> Option<CachedImage> {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(entry.image.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    fn set(&self, key: CacheKey, image: CachedImage, cost: u64) {
        if cost > self.budget {
            debug!(key = %key, cost, budget = self.budget, "Image exceeds memory budget, not retained");
            self.emit(EvictedImage { key, image });
            return;
        }

        let mut evicted = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.entries.contains(&key) {
                trace!(key = %key, "Image already in memory cache");
                return;
            }
            inner.entries.push(key.clone(), Entry { image, cost });
            inner.total_cost += cost;

            while inner.total_cost > self.budget {
                let Some((old_key, old)) = inner.entries.pop_lru() else {
                    break;
                };
                inner.total_cost -= old.cost;
                evicted.push(EvictedImage {
                    key: old_key,
                    image: old.image,
                });
            }
            debug!(key = %key, cost, total_cost = inner.total_cost, "Stored image in memory cache");
        }

        for item in evicted {
            debug!(key = %item.key, "Evicted image from memory cache");
            self.emit(item);
        }
    }

    fn remove(&self, key: &CacheKey) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.pop(key) {
            inner.total_cost -= entry.cost;
            debug!(key = %key, "Removed image from memory cache");
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_cost = 0;
        debug!("Cleared memory image cache");
    }
}
