//! Hands memory-tier evictions to the disk tier.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::memory_cache::EvictedImage;
use crate::domain::ports::ImageStorePort;

/// Spawns a task persisting every evicted image that is not on disk yet.
///
/// The task ends once every sender is dropped and the queue is drained.
pub fn spawn_eviction_writer(
    mut rx: mpsc::Receiver<EvictedImage>,
    store: Arc<dyn ImageStorePort>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut written = 0usize;
        while let Some(evicted) = rx.recv().await {
            if store.contains(&evicted.key).await {
                trace!(key = %evicted.key, "Evicted image already on disk");
                continue;
            }
            store.write(&evicted.key, evicted.image.encoded).await;
            written += 1;
        }
        debug!(written, "Eviction writer stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CacheKey, CachedImage, fixtures};
    use crate::domain::ports::ImageCachePort;
    use crate::infrastructure::image::disk_cache::{DiskImageCache, ReclaimPolicy};
    use crate::infrastructure::image::memory_cache::MemoryImageCache;

    #[tokio::test]
    async fn test_evicted_images_are_persisted() {
        let temp = tempfile::TempDir::new().unwrap();
        let disk = Arc::new(
            DiskImageCache::new(temp.path().to_path_buf(), ReclaimPolicy::default())
                .await
                .unwrap(),
        );
        let (tx, rx) = mpsc::channel(4);
        let writer = spawn_eviction_writer(rx, disk.clone());

        let memory = MemoryImageCache::new(10).with_eviction_sink(tx);
        let image = CachedImage::decode(fixtures::png_bytes(3, 3)).unwrap();
        memory.set(CacheKey::digest("a"), image.clone(), 10);
        memory.set(CacheKey::digest("b"), image, 10);
        drop(memory);
        writer.await.unwrap();

        assert!(disk.contains(&CacheKey::digest("a")).await);
        assert!(!disk.contains(&CacheKey::digest("b")).await);
        let restored = disk.read(&CacheKey::digest("a")).await.unwrap();
        assert_eq!(restored.image.width(), 3);
    }
}
