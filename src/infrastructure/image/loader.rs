//! Async image loading orchestrator.
//!
//! Implements a three-tier cache: Memory -> Disk -> Network. Network fetches
//! go through the [`FetchCoordinator`] so each identifier is downloaded at
//! most once at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::join_all;
use parking_lot::Mutex;
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::domain::entities::{CacheKey, CachedImage, FetchPriority, ImageSource, LoadedImage};
use crate::domain::errors::ImageError;
use crate::domain::ports::{
    CacheError, CacheResult, ImageCachePort, ImageFetcherPort, ImageLoaderPort, ImageStorePort,
    ReclaimReport,
};

use super::disk_cache::{DiskImageCache, ReclaimPolicy};
use super::eviction::spawn_eviction_writer;
use super::fetch_coordinator::{FetchCoordinator, FetchOutcome};
use super::http_fetcher::HttpImageFetcher;
use super::memory_cache::{CacheStats, DEFAULT_MEMORY_BUDGET, MemoryImageCache};
use super::throttle::DownloadThrottle;

/// Configuration for the image loader.
#[derive(Debug, Clone)]
pub struct ImageLoaderConfig {
    /// Memory tier budget in bytes.
    pub memory_budget: u64,
    /// Maximum concurrent throttled downloads.
    pub max_concurrent_downloads: usize,
    /// Maximum concurrent background downloads.
    pub max_background_downloads: usize,
    /// Persist network payloads to disk right away, not only on eviction.
    pub write_through: bool,
    /// Capacity of the eviction queue feeding the disk tier.
    pub eviction_queue: usize,
}

impl Default for ImageLoaderConfig {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_MEMORY_BUDGET,
            max_concurrent_downloads: 4,
            max_background_downloads: 2,
            write_through: true,
            eviction_queue: 256,
        }
    }
}

struct PendingEntry {
    id: u64,
    token: CancellationToken,
    waiters: usize,
}

type PendingMap = Mutex<HashMap<String, PendingEntry>>;

/// Registration of one `load` call; unregisters on drop.
struct PendingLoad<'a> {
    pending: &'a PendingMap,
    identifier: &'a str,
    id: u64,
    token: CancellationToken,
}

impl Drop for PendingLoad<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        if let Some(entry) = pending.get_mut(self.identifier)
            && entry.id == self.id
        {
            entry.waiters -= 1;
            if entry.waiters == 0 {
                pending.remove(self.identifier);
            }
        }
    }
}

/// Everything the detached network fetch needs.
#[derive(Clone)]
struct NetworkFetch {
    memory_cache: Arc<MemoryImageCache>,
    disk_cache: Arc<dyn ImageStorePort>,
    fetcher: Arc<dyn ImageFetcherPort>,
    throttle: DownloadThrottle,
    write_through: bool,
}

impl NetworkFetch {
    async fn run(
        self,
        url: Url,
        key: CacheKey,
        identifier: String,
        priority: FetchPriority,
        token: CancellationToken,
    ) -> FetchOutcome {
        let _permit = self.throttle.admit(priority, &token).await?;
        if token.is_cancelled() {
            return Err(ImageError::Cancelled);
        }

        debug!(key = %key, url = %url, %priority, "Downloading image from network");
        let response = self.fetcher.get(&url).await?;
        if !response.is_success() {
            return Err(ImageError::HttpStatus {
                code: response.status,
            });
        }
        if response.body.is_empty() {
            return Err(ImageError::decode("empty response body"));
        }

        let image = CachedImage::decode_blocking(response.body).await?;
        self.memory_cache
            .set(key.clone(), image.clone(), image.cost());

        if self.write_through {
            let disk_cache = Arc::clone(&self.disk_cache);
            let key = key.clone();
            let encoded = image.encoded.clone();
            tokio::spawn(async move {
                disk_cache.write(&key, encoded).await;
            });
        }

        debug!(key = %key, source = "network", "Image loaded successfully");
        Ok(LoadedImage {
            key,
            identifier,
            image,
            source: ImageSource::Network,
        })
    }
}

/// Orchestrates image loading from memory, disk, and network.
///
/// Holds no cached data of its own: the tiers and the fetch registry own
/// their state. Construct once per process and share it.
pub struct ImageLoader {
    memory_cache: Arc<MemoryImageCache>,
    disk_cache: Arc<dyn ImageStorePort>,
    fetcher: Arc<dyn ImageFetcherPort>,
    coordinator: Arc<FetchCoordinator>,
    throttle: DownloadThrottle,
    pending: PendingMap,
    next_pending_id: AtomicU64,
    config: ImageLoaderConfig,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ImageLoader {
    /// Creates a loader over the given disk tier and transport.
    ///
    /// Spawns the eviction writer, so this must be called within a Tokio
    /// runtime.
    #[must_use]
    pub fn new(
        config: ImageLoaderConfig,
        disk_cache: Arc<dyn ImageStorePort>,
        fetcher: Arc<dyn ImageFetcherPort>,
    ) -> Self {
        let (eviction_tx, eviction_rx) = mpsc::channel(config.eviction_queue.max(1));
        let memory_cache =
            Arc::new(MemoryImageCache::new(config.memory_budget).with_eviction_sink(eviction_tx));
        spawn_eviction_writer(eviction_rx, Arc::clone(&disk_cache));

        let throttle = DownloadThrottle::new(
            config.max_concurrent_downloads,
            config.max_background_downloads,
        );

        Self {
            memory_cache,
            disk_cache,
            fetcher,
            coordinator: Arc::new(FetchCoordinator::new()),
            throttle,
            pending: Mutex::new(HashMap::new()),
            next_pending_id: AtomicU64::new(0),
            config,
        }
    }

    /// Creates a loader with default configuration, the default disk
    /// location and an HTTP transport.
    ///
    /// # Errors
    /// Returns error if disk cache or HTTP client cannot be created.
    pub async fn with_defaults() -> CacheResult<Self> {
        let disk_cache = Arc::new(DiskImageCache::default_location(ReclaimPolicy::default()).await?);
        let fetcher = HttpImageFetcher::new(
            std::time::Duration::from_secs(30),
            &format!("{}/{}", crate::NAME, crate::VERSION),
        )
        .map_err(|e| CacheError::NetworkError(e.to_string()))?;
        Ok(Self::new(
            ImageLoaderConfig::default(),
            disk_cache,
            Arc::new(fetcher),
        ))
    }

    /// Returns the memory tier.
    #[must_use]
    pub fn memory_cache(&self) -> &MemoryImageCache {
        &self.memory_cache
    }

    /// Returns the fetch registry.
    #[must_use]
    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    /// Returns true if a network fetch for `identifier` is in flight.
    #[must_use]
    pub fn is_loading(&self, identifier: &str) -> bool {
        self.coordinator.is_in_flight(identifier)
    }

    /// Returns the number of identifiers with an active `load` call.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn track<'a>(&'a self, identifier: &'a str) -> PendingLoad<'a> {
        let mut pending = self.pending.lock();
        let entry = pending
            .entry(identifier.to_owned())
            .or_insert_with(|| PendingEntry {
                id: self.next_pending_id.fetch_add(1, Ordering::Relaxed),
                token: CancellationToken::new(),
                waiters: 0,
            });
        entry.waiters += 1;
        PendingLoad {
            pending: &self.pending,
            identifier,
            id: entry.id,
            token: entry.token.clone(),
        }
    }

    /// Loads an image, checking caches first.
    ///
    /// # Errors
    /// Returns [`ImageError::InvalidIdentifier`] for anything but an absolute
    /// http(s) URL, [`ImageError::Cancelled`] if cancelled, or the network or
    /// decode failure.
    pub async fn load(
        &self,
        identifier: &str,
        priority: FetchPriority,
    ) -> Result<LoadedImage, ImageError> {
        let url = parse_identifier(identifier)?;
        let key = CacheKey::digest(identifier);

        if let Some(image) = self.memory_cache.get(&key) {
            return Ok(LoadedImage {
                key,
                identifier: identifier.to_owned(),
                image,
                source: ImageSource::MemoryCache,
            });
        }

        let pending = self.track(identifier);
        if pending.token.is_cancelled() {
            return Err(ImageError::Cancelled);
        }

        if let Some(image) = self.disk_cache.read(&key).await {
            self.memory_cache
                .set(key.clone(), image.clone(), image.cost());
            return Ok(LoadedImage {
                key,
                identifier: identifier.to_owned(),
                image,
                source: ImageSource::DiskCache,
            });
        }

        if pending.token.is_cancelled() {
            trace!(identifier, "Load cancelled before network fetch");
            return Err(ImageError::Cancelled);
        }

        // A concurrent fetch may have finished while the disk was read.
        if let Some(image) = self.memory_cache.get(&key) {
            return Ok(LoadedImage {
                key,
                identifier: identifier.to_owned(),
                image,
                source: ImageSource::MemoryCache,
            });
        }

        let network = NetworkFetch {
            memory_cache: Arc::clone(&self.memory_cache),
            disk_cache: Arc::clone(&self.disk_cache),
            fetcher: Arc::clone(&self.fetcher),
            throttle: self.throttle.clone(),
            write_through: self.config.write_through,
        };
        let owned_identifier = identifier.to_owned();
        self.coordinator
            .acquire(identifier, priority, move |token| {
                network.run(url, key, owned_identifier, priority, token)
            })
            .await
    }

    /// Loads a batch concurrently, keeping only the successes in request
    /// order.
    ///
    /// # Errors
    /// Returns [`ImageError::NoData`] when nothing loaded, or
    /// [`ImageError::Cancelled`] when every request was cancelled.
    pub async fn load_many(
        &self,
        identifiers: &[String],
        priority: FetchPriority,
    ) -> Result<Vec<LoadedImage>, ImageError> {
        let results = join_all(identifiers.iter().map(|id| self.load(id, priority))).await;

        let mut images = Vec::with_capacity(results.len());
        let mut cancelled = 0usize;
        for (identifier, result) in identifiers.iter().zip(results) {
            match result {
                Ok(image) => images.push(image),
                Err(ImageError::Cancelled) => cancelled += 1,
                Err(e) => debug!(identifier, error = %e, "Batch item failed"),
            }
        }

        if images.is_empty() {
            if cancelled > 0 && cancelled == identifiers.len() {
                return Err(ImageError::Cancelled);
            }
            return Err(ImageError::NoData);
        }
        debug!(
            loaded = images.len(),
            requested = identifiers.len(),
            "Batch load complete"
        );
        Ok(images)
    }

    /// Cancels pending work for `identifier`.
    ///
    /// Loads still in the memory or disk stage stop at their next checkpoint;
    /// the network fetch, if any, is cancelled for all of its waiters.
    pub fn cancel(&self, identifier: &str) {
        if let Some(entry) = self.pending.lock().remove(identifier) {
            entry.token.cancel();
        }
        if self.coordinator.cancel(identifier) {
            debug!(identifier, "Cancelled image load");
        }
    }

    /// Cancels all pending loads.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (_, entry) in drained {
            entry.token.cancel();
        }
        let count = self.coordinator.cancel_all();
        if count > 0 {
            debug!(count, "Cancelled all pending image loads");
        }
    }

    /// Starts a disk reclamation pass without waiting for it.
    pub fn spawn_reclaim(&self) -> JoinHandle<ReclaimReport> {
        let disk_cache = Arc::clone(&self.disk_cache);
        tokio::spawn(async move {
            let report = disk_cache.reclaim().await;
            info!(%report, "Disk cache reclaimed");
            report
        })
    }

    /// Returns memory cache statistics.
    #[must_use]
    pub fn memory_cache_stats(&self) -> CacheStats {
        self.memory_cache.stats()
    }

    /// Clears all caches.
    pub async fn clear_all(&self) {
        self.memory_cache.clear();
        self.disk_cache.clear().await;
        info!("Cleared all image caches");
    }
}

/// Accepts absolute http(s) URLs only.
fn parse_identifier(identifier: &str) -> Result<Url, ImageError> {
    let url = Url::parse(identifier).map_err(|_| ImageError::invalid_identifier(identifier))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ImageError::invalid_identifier(identifier));
    }
    Ok(url)
}

#[async_trait::async_trait]
impl ImageLoaderPort for ImageLoader {
    async fn load(
        &self,
        identifier: &str,
        priority: FetchPriority,
    ) -> Result<LoadedImage, ImageError> {
        Self::load(self, identifier, priority).await
    }

    async fn load_many(
        &self,
        identifiers: &[String],
        priority: FetchPriority,
    ) -> Result<Vec<LoadedImage>, ImageError> {
        Self::load_many(self, identifiers, priority).await
    }

    fn cancel(&self, identifier: &str) {
        Self::cancel(self, identifier);
    }

    fn cancel_all(&self) {
        Self::cancel_all(self);
    }
}
