//! In-flight fetch registry.
//!
//! Guarantees at most one outstanding fetch per identifier. Concurrent callers
//! for the same identifier share the single fetch's outcome. The fetch runs in
//! its own task, so it finishes even when every waiter has gone away, and its
//! record is dropped before any waiter sees the result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::domain::entities::{FetchPriority, LoadedImage};
use crate::domain::errors::ImageError;

/// Outcome shared by every waiter of one fetch.
pub type FetchOutcome = Result<LoadedImage, ImageError>;

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

type Registry = Arc<Mutex<HashMap<String, InFlightFetch>>>;

struct InFlightFetch {
    generation: u64,
    priority: FetchPriority,
    token: CancellationToken,
    result: SharedFetch,
}

/// Drops the registry record when the fetch task ends, however it ends.
///
/// The generation check keeps a finished fetch from removing a newer record
/// that replaced it after a cancel.
struct ReleaseGuard {
    registry: Registry,
    identifier: String,
    generation: u64,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let mut in_flight = self.registry.lock();
        if in_flight
            .get(&self.identifier)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            in_flight.remove(&self.identifier);
            trace!(identifier = %self.identifier, "Released in-flight fetch");
        }
    }
}

/// Registry of in-flight fetches keyed by identifier.
#[derive(Default)]
pub struct FetchCoordinator {
    in_flight: Registry,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

impl FetchCoordinator {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the outcome of the fetch for `identifier`, starting one with
    /// `fetch` only if none is in flight.
    ///
    /// `fetch` receives the cancellation token of the new record and is
    /// invoked at most once per call. Cancellation resolves every waiter with
    /// [`ImageError::Cancelled`].
    ///
    /// # Errors
    /// Returns whatever the shared fetch produced.
    pub async fn acquire<F, Fut>(
        &self,
        identifier: &str,
        priority: FetchPriority,
        fetch: F,
    ) -> FetchOutcome
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = FetchOutcome> + Send + 'static,
    {
        let result = self.attach_or_start(identifier, priority, fetch);
        result.await
    }

    fn attach_or_start<F, Fut>(
        &self,
        identifier: &str,
        priority: FetchPriority,
        fetch: F,
    ) -> SharedFetch
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = FetchOutcome> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock();
        if let Some(existing) = in_flight.get(identifier) {
            trace!(
                identifier,
                running = %existing.priority,
                requested = %priority,
                "Joining in-flight fetch"
            );
            return existing.result.clone();
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let work = fetch(token.clone());
        let guard = ReleaseGuard {
            registry: Arc::clone(&self.in_flight),
            identifier: identifier.to_owned(),
            generation,
        };
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = cancelled.cancelled() => Err(ImageError::Cancelled),
                result = work => result,
            };
            drop(guard);
            outcome
        });

        let result = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(ImageError::transport(format!("fetch task failed: {e}"))))
        }
        .boxed()
        .shared();

        in_flight.insert(
            identifier.to_owned(),
            InFlightFetch {
                generation,
                priority,
                token,
                result: result.clone(),
            },
        );
        debug!(identifier, %priority, "Started fetch");
        result
    }

    /// Cancels the in-flight fetch for `identifier` and forgets it.
    ///
    /// Returns true if a fetch was in flight.
    pub fn cancel(&self, identifier: &str) -> bool {
        let removed = self.in_flight.lock().remove(identifier);
        removed.is_some_and(|entry| {
            entry.token.cancel();
            debug!(identifier, "Cancelled in-flight fetch");
            true
        })
    }

    /// Cancels and forgets every in-flight fetch. Returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.in_flight.lock().drain().collect();
        let count = drained.len();
        for (_, entry) in drained {
            entry.token.cancel();
        }
        if count > 0 {
            debug!(count, "Cancelled all in-flight fetches");
        }
        count
    }

    /// Returns true if a fetch for `identifier` is in flight.
    #[must_use]
    pub fn is_in_flight(&self, identifier: &str) -> bool {
        self.in_flight.lock().contains_key(identifier)
    }

    /// Returns the number of in-flight fetches.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use futures_util::future::join_all;
    use tokio::sync::Semaphore;

    use crate::domain::entities::{CacheKey, CachedImage, ImageSource, fixtures};

    fn loaded(identifier: &str) -> LoadedImage {
        LoadedImage {
            key: CacheKey::digest(identifier),
            identifier: identifier.to_string(),
            image: CachedImage::decode(fixtures::png_bytes(2, 2)).unwrap(),
            source: ImageSource::Network,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_concurrent_acquires_share_one_fetch() {
        let coordinator = FetchCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let requests = (0..8).map(|_| {
            let calls = Arc::clone(&calls);
            coordinator.acquire("https://img.test/a.png", FetchPriority::Normal, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(loaded("https://img.test/a.png")) }
            })
        });
        let results = join_all(requests).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(result.as_ref().unwrap().image.same_image(&first.image));
        }
        assert!(!coordinator.is_in_flight("https://img.test/a.png"));
    }

    #[tokio::test]
    async fn test_failure_is_shared() {
        let coordinator = FetchCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let requests = (0..4).map(|_| {
            let calls = Arc::clone(&calls);
            coordinator.acquire("https://img.test/a.png", FetchPriority::Normal, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ImageError::HttpStatus { code: 503 }) }
            })
        });
        let results = join_all(requests).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap_err(), ImageError::HttpStatus { code: 503 });
        }
    }

    #[tokio::test]
    async fn test_completed_fetch_is_forgotten() {
        let coordinator = FetchCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            coordinator
                .acquire("https://img.test/a.png", FetchPriority::Normal, move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(loaded("https://img.test/a.png")) }
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_resolves_waiters_and_allows_fresh_fetch() {
        let coordinator = Arc::new(FetchCoordinator::new());
        let url = "https://img.test/slow.png";

        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .acquire(url, FetchPriority::Normal, |_| std::future::pending())
                    .await
            })
        };
        wait_until(|| coordinator.is_in_flight(url)).await;

        assert!(coordinator.cancel(url));
        assert_eq!(waiter.await.unwrap().unwrap_err(), ImageError::Cancelled);
        assert!(!coordinator.is_in_flight(url));
        assert!(!coordinator.cancel(url));

        let fresh = coordinator
            .acquire(url, FetchPriority::Normal, |_| async { Ok(loaded(url)) })
            .await;
        assert!(fresh.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let coordinator = Arc::new(FetchCoordinator::new());
        let urls = ["https://img.test/a.png", "https://img.test/b.png"];

        let waiters: Vec<_> = urls
            .into_iter()
            .map(|url| {
                let coordinator = Arc::clone(&coordinator);
                tokio::spawn(async move {
                    coordinator
                        .acquire(url, FetchPriority::Background, |_| std::future::pending())
                        .await
                })
            })
            .collect();
        wait_until(|| coordinator.in_flight_count() == 2).await;

        assert_eq!(coordinator.cancel_all(), 2);
        for waiter in waiters {
            assert!(waiter.await.unwrap().unwrap_err().is_cancelled());
        }
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_completion_keeps_newer_record() {
        let coordinator = Arc::new(FetchCoordinator::new());
        let url = "https://img.test/raced.png";
        let gate = Arc::new(Semaphore::new(0));

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .acquire(url, FetchPriority::Normal, |_| std::future::pending())
                    .await
            })
        };
        wait_until(|| coordinator.is_in_flight(url)).await;
        coordinator.cancel(url);

        let second = {
            let coordinator = Arc::clone(&coordinator);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                coordinator
                    .acquire(url, FetchPriority::Normal, move |_| async move {
                        let _permit = gate.acquire().await;
                        Ok(loaded(url))
                    })
                    .await
            })
        };
        wait_until(|| coordinator.is_in_flight(url)).await;

        assert!(first.await.unwrap().unwrap_err().is_cancelled());
        assert!(coordinator.is_in_flight(url));

        gate.add_permits(1);
        assert!(second.await.unwrap().is_ok());
        assert!(!coordinator.is_in_flight(url));
    }

    #[tokio::test]
    async fn test_fetch_survives_dropped_waiters() {
        let coordinator = Arc::new(FetchCoordinator::new());
        let finished = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let url = "https://img.test/orphan.png";

        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            let finished = Arc::clone(&finished);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                coordinator
                    .acquire(url, FetchPriority::Normal, move |_| async move {
                        let _permit = gate.acquire().await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok(loaded(url))
                    })
                    .await
            })
        };
        wait_until(|| coordinator.is_in_flight(url)).await;
        waiter.abort();
        gate.add_permits(1);

        wait_until(|| !coordinator.is_in_flight(url)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
