//! Priority-aware download throttling.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::domain::entities::FetchPriority;
use crate::domain::errors::ImageError;

/// Limits concurrent downloads by priority.
///
/// - `Elevated` is never throttled.
/// - `Normal` takes a permit from the shared pool.
/// - `Background` takes a background permit first, then a shared one, so
///   prefetching can never occupy the whole pool.
#[derive(Debug, Clone)]
pub struct DownloadThrottle {
    shared: Arc<Semaphore>,
    background: Arc<Semaphore>,
}

/// Held for the duration of a download.
#[derive(Debug)]
pub struct DownloadPermit {
    _shared: Option<OwnedSemaphorePermit>,
    _background: Option<OwnedSemaphorePermit>,
}

impl DownloadThrottle {
    /// Creates a throttle with `max_concurrent` shared slots, of which at most
    /// `max_background` may be used by background fetches.
    #[must_use]
    pub fn new(max_concurrent: usize, max_background: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            shared: Arc::new(Semaphore::new(max_concurrent)),
            background: Arc::new(Semaphore::new(max_background.clamp(1, max_concurrent))),
        }
    }

    /// Waits for a slot, giving up when `token` is cancelled.
    ///
    /// # Errors
    /// Returns [`ImageError::Cancelled`] if cancelled while waiting.
    pub async fn admit(
        &self,
        priority: FetchPriority,
        token: &CancellationToken,
    ) -> Result<DownloadPermit, ImageError> {
        match priority {
            FetchPriority::Elevated => Ok(DownloadPermit {
                _shared: None,
                _background: None,
            }),
            FetchPriority::Normal => Ok(DownloadPermit {
                _shared: Some(acquire(&self.shared, token).await?),
                _background: None,
            }),
            FetchPriority::Background => {
                let background = acquire(&self.background, token).await?;
                let shared = acquire(&self.shared, token).await?;
                Ok(DownloadPermit {
                    _shared: Some(shared),
                    _background: Some(background),
                })
            }
        }
    }

    /// Returns the number of free shared slots.
    #[must_use]
    pub fn available(&self) -> usize {
        self.shared.available_permits()
    }
}

async fn acquire(
    semaphore: &Arc<Semaphore>,
    token: &CancellationToken,
) -> Result<OwnedSemaphorePermit, ImageError> {
    tokio::select! {
        () = token.cancelled() => Err(ImageError::Cancelled),
        permit = Arc::clone(semaphore).acquire_owned() => {
            permit.map_err(|e| ImageError::transport(format!("download throttle closed: {e}")))
        }
    }
}
