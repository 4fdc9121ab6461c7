//! Port definitions for the memory and disk cache tiers.

use bytes::Bytes;

use crate::domain::entities::{CacheKey, CachedImage};

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur while setting up or writing a cache tier.
///
/// Never surfaced from reads: a disk problem is just a miss.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
    /// Network client could not be set up.
    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Port for the volatile in-memory tier.
///
/// Calls never suspend and never fail; a miss is the only negative outcome.
pub trait ImageCachePort: Send + Sync {
    /// Returns the cached image and marks it most recently used.
    fn get(&self, key: &CacheKey) -> Option<CachedImage>;

    /// Inserts an image unless the key is already present (first writer wins).
    /// May evict other entries to stay within budget.
    fn set(&self, key: CacheKey, image: CachedImage, cost: u64);

    /// Removes an entry. Missing keys are ignored.
    fn remove(&self, key: &CacheKey);

    /// Returns the current number of cached images.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all images from the cache.
    fn clear(&self);
}

/// Outcome of a disk reclamation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Files removed for exceeding the maximum age.
    pub expired: usize,
    /// Files removed to get back under the size budget.
    pub evicted_for_size: usize,
    /// Bytes released by the sweep.
    pub freed_bytes: u64,
    /// Bytes still held after the sweep.
    pub remaining_bytes: u64,
    /// Cache files still present after the sweep.
    pub remaining_files: usize,
}

impl ReclaimReport {
    /// Total number of files removed.
    #[must_use]
    pub const fn removed(&self) -> usize {
        self.expired + self.evicted_for_size
    }
}

impl std::fmt::Display for ReclaimReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Reclaimed {} files ({} expired, {} over budget), freed {} bytes, {} files / {} bytes remain",
            self.removed(),
            self.expired,
            self.evicted_for_size,
            self.freed_bytes,
            self.remaining_files,
            self.remaining_bytes
        )
    }
}

/// Port for the durable on-disk tier.
///
/// Disk problems degrade to misses or silent no-ops; the network stays the
/// source of truth.
#[async_trait::async_trait]
pub trait ImageStorePort: Send + Sync {
    /// Reads and decodes the payload stored under `key`.
    async fn read(&self, key: &CacheKey) -> Option<CachedImage>;

    /// Persists a payload atomically. Failures are logged, not returned.
    async fn write(&self, key: &CacheKey, bytes: Bytes);

    /// Runs the age and size reclamation sweep.
    async fn reclaim(&self) -> ReclaimReport;

    /// Removes the payload stored under `key`, if any.
    async fn remove(&self, key: &CacheKey);

    /// Checks if a payload is stored under `key`.
    async fn contains(&self, key: &CacheKey) -> bool;

    /// Removes every cached payload.
    async fn clear(&self);
}
