//! Domain layer with core entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CacheKey, CachedImage, FetchPriority, ImageSource, LoadedImage};
pub use errors::ImageError;
pub use ports::{ImageCachePort, ImageFetcherPort, ImageLoaderPort, ImageStorePort};
