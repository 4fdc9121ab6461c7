//! Domain entity definitions.

mod cache_key;
mod image;

pub use cache_key::{CACHE_KEY_LEN, CacheKey};
pub use image::{CachedImage, FetchPriority, ImageSource, ImageStatus, LoadedImage};

#[cfg(test)]
pub(crate) use image::fixtures;
