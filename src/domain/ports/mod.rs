//! Port definitions for the cache tiers, transport and loader.

mod image_cache_port;
mod image_fetcher_port;
mod image_loader_port;

pub use image_cache_port::{CacheError, CacheResult, ImageCachePort, ImageStorePort, ReclaimReport};
pub use image_fetcher_port::{FetchResponse, ImageFetcherPort};
pub use image_loader_port::ImageLoaderPort;

#[cfg(test)]
pub mod mocks {
    pub use super::image_fetcher_port::mock::{MockImageFetcher, MockReply};
}
