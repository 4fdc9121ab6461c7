//! Feed image use case: what a scrolling list of image cells needs.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::entities::{FetchPriority, ImageStatus, LoadedImage};
use crate::domain::errors::ImageError;
use crate::domain::ports::{ImageLoaderPort, ImageStorePort, ReclaimReport};

/// Drives image loading for a feed of cells.
///
/// Visible cells load at [`FetchPriority::Elevated`], upcoming cells are
/// prefetched at [`FetchPriority::Background`]. The last known status of
/// every identifier is kept so a cell can render a placeholder, the image or
/// an error.
#[derive(Clone)]
pub struct FeedImagesUseCase {
    loader: Arc<dyn ImageLoaderPort>,
    store: Arc<dyn ImageStorePort>,
    statuses: Arc<Mutex<HashMap<String, ImageStatus>>>,
}

impl FeedImagesUseCase {
    /// Creates new use case.
    #[must_use]
    pub fn new(loader: Arc<dyn ImageLoaderPort>, store: Arc<dyn ImageStorePort>) -> Self {
        Self {
            loader,
            store,
            statuses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Starts the disk reclamation pass in the background.
    pub fn startup(&self) -> JoinHandle<ReclaimReport> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let report = store.reclaim().await;
            info!(%report, "Startup cache reclamation finished");
            report
        })
    }

    /// Loads the image of a cell that became visible.
    pub async fn on_appear(&self, url: &str) -> ImageStatus {
        self.set_status(url, ImageStatus::Loading);
        let result = self.loader.load(url, FetchPriority::Elevated).await;
        let status = ImageStatus::from_result(&result);
        if let Err(e) = &result {
            debug!(url, error = %e, "Visible image failed to load");
        }
        self.set_status(url, status.clone());
        status
    }

    /// Loads the image of a visible cell and returns it when ready.
    ///
    /// # Errors
    /// Returns the load failure.
    pub async fn image(&self, url: &str) -> Result<LoadedImage, ImageError> {
        self.set_status(url, ImageStatus::Loading);
        let result = self.loader.load(url, FetchPriority::Elevated).await;
        self.set_status(url, ImageStatus::from_result(&result));
        result
    }

    /// Cancels the load of a cell that scrolled away.
    pub fn on_disappear(&self, url: &str) {
        self.loader.cancel(url);
        self.statuses.lock().remove(url);
    }

    /// Warms the caches for upcoming cells. Returns the number of images
    /// now available.
    pub async fn prefetch(&self, urls: &[String]) -> usize {
        if urls.is_empty() {
            return 0;
        }
        match self.loader.load_many(urls, FetchPriority::Background).await {
            Ok(images) => {
                debug!(
                    warmed = images.len(),
                    requested = urls.len(),
                    "Prefetch complete"
                );
                images.len()
            }
            Err(e) => {
                debug!(requested = urls.len(), error = %e, "Prefetch yielded nothing");
                0
            }
        }
    }

    /// Cancels prefetching for cells that are no longer upcoming.
    pub fn cancel_prefetch(&self, urls: &[String]) {
        for url in urls {
            self.loader.cancel(url);
        }
    }

    /// Cancels everything and forgets all statuses (pull-to-refresh).
    pub fn reset(&self) {
        self.loader.cancel_all();
        self.statuses.lock().clear();
        debug!("Feed images reset");
    }

    /// Returns the last known status of `url`.
    #[must_use]
    pub fn status(&self, url: &str) -> ImageStatus {
        self.statuses.lock().get(url).cloned().unwrap_or_default()
    }

    fn set_status(&self, url: &str, status: ImageStatus) {
        self.statuses.lock().insert(url.to_owned(), status);
    }
}
