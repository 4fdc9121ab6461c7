//! Disk-based image cache for persistence across sessions.
//!
//! Files live directly in the cache directory, named by [`CacheKey`] with no
//! extension. There is no index: the directory listing is the source of truth
//! for both lookups and reclamation. Writes go through a dot-prefixed temp
//! file that is renamed into place, so readers never see a partial payload.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio::fs;
use tracing::{debug, trace, warn};

use crate::domain::entities::{CacheKey, CachedImage};
use crate::domain::ports::{CacheError, CacheResult, ImageStorePort, ReclaimReport};

/// Maximum disk cache size in bytes (100 MB default).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum age of a cache file (7 days default).
pub const DEFAULT_MAX_FILE_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const TEMP_PREFIX: &str = ".pending-";

/// Size and age limits enforced by [`DiskImageCache::reclaim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimPolicy {
    /// Total byte budget for cache files.
    pub max_size: u64,
    /// Files last modified longer ago than this are removed unconditionally.
    pub max_age: Duration,
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_CACHE_SIZE,
            max_age: DEFAULT_MAX_FILE_AGE,
        }
    }
}

/// Current footprint of the cache directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    /// Number of cache files.
    pub files: usize,
    /// Summed size of cache files.
    pub bytes: u64,
}

struct DiskEntry {
    path: PathBuf,
    key: Option<CacheKey>,
    size: u64,
    modified: SystemTime,
}

/// Disk-based image cache that persists raw image bytes.
#[derive(Debug)]
pub struct DiskImageCache {
    cache_dir: PathBuf,
    policy: ReclaimPolicy,
}

impl DiskImageCache {
    /// Creates a new disk cache in the specified directory.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created.
    pub async fn new(cache_dir: PathBuf, policy: ReclaimPolicy) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to create cache dir: {e}")))?;
        debug!(path = %cache_dir.display(), "Disk cache ready");
        Ok(Self { cache_dir, policy })
    }

    /// Creates a cache in the default location (`<platform cache dir>/images`).
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created.
    pub async fn default_location(policy: ReclaimPolicy) -> CacheResult<Self> {
        Self::new(default_cache_dir(), policy).await
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the reclamation policy.
    #[must_use]
    pub const fn policy(&self) -> ReclaimPolicy {
        self.policy
    }

    fn cache_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(key.as_str())
    }

    /// Gets raw image bytes from disk cache.
    pub async fn read_bytes(&self, key: &CacheKey) -> Option<Bytes> {
        let path = self.cache_path(key);
        match fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => {
                trace!(key = %key, path = %path.display(), "Disk cache hit");
                Some(Bytes::from(bytes))
            }
            Ok(_) => {
                debug!(key = %key, "Ignoring empty cache file");
                None
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(key = %key, "Disk cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read cache file");
                None
            }
        }
    }

    /// Stores raw bytes, reporting failures.
    ///
    /// # Errors
    /// Returns error if the temp file cannot be written or moved into place.
    pub async fn try_write(&self, key: &CacheKey, bytes: Bytes) -> CacheResult<()> {
        let dir = self.cache_dir.clone();
        let path = self.cache_path(key);
        let size = bytes.len();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut temp_file = tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .tempfile_in(&dir)?;
            temp_file.write_all(&bytes)?;
            temp_file.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::IoError(format!("Write task panicked: {e}")))?
        .map_err(|e| CacheError::IoError(format!("Failed to write cache file: {e}")))?;

        debug!(key = %key, size, "Stored image in disk cache");
        Ok(())
    }

    /// Enumerates the directory and sums the size of cache files.
    pub async fn usage(&self) -> DiskUsage {
        self.scan()
            .await
            .iter()
            .filter(|entry| entry.key.is_some())
            .fold(DiskUsage::default(), |acc, entry| DiskUsage {
                files: acc.files + 1,
                bytes: acc.bytes + entry.size,
            })
    }

    async fn scan(&self) -> Vec<DiskEntry> {
        let mut files = Vec::new();
        let mut entries = match fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.cache_dir.display(), error = %e, "Failed to read cache dir");
                return files;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let key = entry.file_name().to_str().and_then(CacheKey::parse);
            files.push(DiskEntry {
                path: entry.path(),
                key,
                size: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        files
    }

    /// Runs the reclamation sweep with the configured policy.
    ///
    /// Expired files go first regardless of the total size; if the remaining
    /// files still exceed the budget they are removed oldest first. A file that
    /// cannot be removed is skipped.
    pub async fn reclaim_with(&self, policy: ReclaimPolicy) -> ReclaimReport {
        let now = SystemTime::now();
        let entries = self.scan().await;
        let mut report = ReclaimReport::default();

        let mut total: u64 = entries
            .iter()
            .filter(|entry| entry.key.is_some())
            .map(|entry| entry.size)
            .sum();

        let mut survivors = Vec::with_capacity(entries.len());
        for entry in entries {
            let expired = now
                .duration_since(entry.modified)
                .is_ok_and(|age| age > policy.max_age);

            if !expired {
                if entry.key.is_some() {
                    survivors.push(entry);
                }
                continue;
            }

            if remove_quietly(&entry.path).await {
                report.freed_bytes += entry.size;
                if entry.key.is_some() {
                    report.expired += 1;
                    total -= entry.size;
                } else {
                    debug!(path = %entry.path.display(), "Removed stale temp file");
                }
            } else if entry.key.is_some() {
                survivors.push(entry);
            }
        }

        survivors.sort_by_key(|entry| entry.modified);

        let mut remaining_files = survivors.len();
        for entry in &survivors {
            if total <= policy.max_size {
                break;
            }
            if remove_quietly(&entry.path).await {
                total -= entry.size;
                report.freed_bytes += entry.size;
                report.evicted_for_size += 1;
                remaining_files -= 1;
            }
        }

        report.remaining_bytes = total;
        report.remaining_files = remaining_files;

        debug!(
            expired = report.expired,
            evicted_for_size = report.evicted_for_size,
            freed_bytes = report.freed_bytes,
            remaining_bytes = report.remaining_bytes,
            "Disk cache reclaim complete"
        );
        report
    }
}

/// Removes a file, treating "already gone" as success.
async fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            false
        }
    }
}

#[async_trait::async_trait]
impl ImageStorePort for DiskImageCache {
    async fn read(&self, key: &CacheKey) -> Option<CachedImage> {
        let bytes = self.read_bytes(key).await?;
        match CachedImage::decode_blocking(bytes).await {
            Ok(image) => {
                debug!(key = %key, "Decoded image from disk cache");
                Some(image)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping undecodable cache file");
                remove_quietly(&self.cache_path(key)).await;
                None
            }
        }
    }

    async fn write(&self, key: &CacheKey, bytes: Bytes) {
        if let Err(e) = self.try_write(key, bytes).await {
            warn!(key = %key, error = %e, "Failed to cache to disk");
        }
    }

    async fn reclaim(&self) -> ReclaimReport {
        self.reclaim_with(self.policy).await
    }

    async fn remove(&self, key: &CacheKey) {
        if remove_quietly(&self.cache_path(key)).await {
            debug!(key = %key, "Removed from disk cache");
        }
    }

    async fn contains(&self, key: &CacheKey) -> bool {
        fs::try_exists(self.cache_path(key)).await.unwrap_or(false)
    }

    async fn clear(&self) {
        for entry in self.scan().await {
            remove_quietly(&entry.path).await;
        }
        debug!("Cleared disk cache");
    }
}

/// Returns the default cache directory path.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from(
        crate::APP_QUALIFIER,
        crate::APP_ORGANIZATION,
        crate::NAME,
    )
    .map_or_else(
        || std::env::temp_dir().join(crate::NAME).join("cache").join("images"),
        |dirs| dirs.cache_dir().join("images"),
    )
}
