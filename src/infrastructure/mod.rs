//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Image handling (caching, loading, fetch deduplication).
pub mod image;

pub use config::{AppConfig, CliArgs, LogLevel, StorageManager};
pub use image::{
    CacheStats, DiskImageCache, FetchCoordinator, HttpImageFetcher, ImageLoader,
    ImageLoaderConfig, MemoryImageCache, ReclaimPolicy,
};
