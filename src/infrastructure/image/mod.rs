//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction by cost
//! - Disk caching with age and size reclamation
//! - In-flight fetch deduplication
//! - Async image loading pipeline

pub mod disk_cache;
pub mod eviction;
pub mod fetch_coordinator;
pub mod http_fetcher;
pub mod loader;
pub mod memory_cache;
pub mod throttle;

pub use disk_cache::{DiskImageCache, DiskUsage, ReclaimPolicy};
pub use fetch_coordinator::FetchCoordinator;
pub use http_fetcher::HttpImageFetcher;
pub use loader::{ImageLoader, ImageLoaderConfig};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use throttle::DownloadThrottle;
