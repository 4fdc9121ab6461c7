//! Domain types for image handling.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::CacheKey;
use crate::domain::errors::ImageError;

/// A decoded image together with the encoded bytes it came from.
///
/// The memory tier holds both so an evicted entry can be persisted without
/// re-encoding. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct CachedImage {
    /// Decoded pixels.
    pub image: Arc<image::DynamicImage>,
    /// Original encoded payload.
    pub encoded: Bytes,
}

impl CachedImage {
    /// Decodes an encoded payload.
    ///
    /// CPU-bound; call from a blocking context for large inputs.
    ///
    /// # Errors
    /// Returns [`ImageError::Decode`] for empty or undecodable bytes.
    pub fn decode(encoded: Bytes) -> Result<Self, ImageError> {
        if encoded.is_empty() {
            return Err(ImageError::decode("empty payload"));
        }
        let image =
            image::load_from_memory(&encoded).map_err(|e| ImageError::decode(e.to_string()))?;
        Ok(Self {
            image: Arc::new(image),
            encoded,
        })
    }

    /// Decodes on the blocking pool.
    ///
    /// # Errors
    /// Returns [`ImageError::Decode`] if decoding fails or the task panics.
    pub async fn decode_blocking(encoded: Bytes) -> Result<Self, ImageError> {
        tokio::task::spawn_blocking(move || Self::decode(encoded))
            .await
            .map_err(|e| ImageError::decode(format!("decode task panicked: {e}")))?
    }

    /// Estimated resident size in bytes: decoded buffer plus encoded payload.
    #[must_use]
    pub fn cost(&self) -> u64 {
        (self.image.as_bytes().len() + self.encoded.len()) as u64
    }

    /// Returns true if both values share the same decoded buffer.
    #[must_use]
    pub fn same_image(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from the in-memory LRU cache.
    MemoryCache,
    /// Loaded from the disk cache.
    DiskCache,
    /// Downloaded from the network.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A successfully acquired image.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Cache key derived from the identifier.
    pub key: CacheKey,
    /// Identifier the image was requested with.
    pub identifier: String,
    /// The image payload.
    pub image: CachedImage,
    /// Tier that served the request.
    pub source: ImageSource,
}

/// Scheduling priority of a network fetch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FetchPriority {
    /// Prefetching for content that is not on screen yet.
    Background,
    /// Regular requests.
    #[default]
    Normal,
    /// Content that is visible right now.
    Elevated,
}

impl std::fmt::Display for FetchPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Background => write!(f, "background"),
            Self::Normal => write!(f, "normal"),
            Self::Elevated => write!(f, "elevated"),
        }
    }
}

/// State of an image-bearing UI element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageStatus {
    /// Nothing requested yet, or the request was cancelled. Shows a placeholder.
    #[default]
    NotStarted,
    /// Request in progress.
    Loading,
    /// Image is ready for display.
    Ready,
    /// Loading failed with a displayable message.
    Failed(String),
}

impl ImageStatus {
    /// Maps a load outcome to a slot state.
    #[must_use]
    pub fn from_result<T>(result: &Result<T, ImageError>) -> Self {
        match result {
            Ok(_) => Self::Ready,
            Err(e) => e.user_message().map_or(Self::NotStarted, Self::Failed),
        }
    }

    /// Returns true if the image is ready for rendering.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns true if loading failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Cursor;

    use bytes::Bytes;

    /// Encodes a small solid PNG.
    pub fn png_bytes(width: u32, height: u32) -> Bytes {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        Bytes::from(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_png() {
        let cached = CachedImage::decode(fixtures::png_bytes(4, 3)).unwrap();
        assert_eq!(cached.image.width(), 4);
        assert_eq!(cached.image.height(), 3);
        assert_eq!(cached.cost(), 4 * 3 * 3 + cached.encoded.len() as u64);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            CachedImage::decode(Bytes::from_static(b"not an image")),
            Err(ImageError::Decode { .. })
        ));
        assert!(matches!(
            CachedImage::decode(Bytes::new()),
            Err(ImageError::Decode { .. })
        ));
    }

    #[test]
    fn test_status_from_cancelled_is_placeholder() {
        let result: Result<(), ImageError> = Err(ImageError::Cancelled);
        assert_eq!(ImageStatus::from_result(&result), ImageStatus::NotStarted);
    }

    #[test]
    fn test_status_from_failure_carries_message() {
        let result: Result<(), ImageError> = Err(ImageError::HttpStatus { code: 429 });
        assert!(ImageStatus::from_result(&result).is_failed());
        assert!(ImageStatus::from_result(&Ok::<_, ImageError>(())).is_ready());
    }
}
