//! Port for the image acquisition service.

use async_trait::async_trait;

use crate::domain::entities::{FetchPriority, LoadedImage};
use crate::domain::errors::ImageError;

/// Port for loading images through the memory, disk and network tiers.
#[async_trait]
pub trait ImageLoaderPort: Send + Sync {
    /// Loads one image, consulting the caches before the network.
    async fn load(
        &self,
        identifier: &str,
        priority: FetchPriority,
    ) -> Result<LoadedImage, ImageError>;

    /// Loads a batch concurrently and returns the successes in request order.
    ///
    /// Fails only when nothing succeeded.
    async fn load_many(
        &self,
        identifiers: &[String],
        priority: FetchPriority,
    ) -> Result<Vec<LoadedImage>, ImageError>;

    /// Cancels any pending load for the identifier.
    fn cancel(&self, identifier: &str);

    /// Cancels every pending load.
    fn cancel_all(&self);
}
