//! Network transport port.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;

use crate::domain::errors::ImageError;

/// Raw response of a single GET request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body; empty for non-success statuses.
    pub body: Bytes,
}

impl FetchResponse {
    /// Returns true for statuses in `200..=299`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status <= 299
    }
}

/// Port for retrieving image payloads over the network.
///
/// Transport failures are errors; HTTP status is returned as-is and validated
/// by the caller.
#[async_trait]
pub trait ImageFetcherPort: Send + Sync {
    /// Issues a GET for `url`.
    async fn get(&self, url: &Url) -> Result<FetchResponse, ImageError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use tokio::sync::Semaphore;

    /// Canned outcome for one URL.
    #[derive(Debug, Clone)]
    pub enum MockReply {
        /// Responds with the given status and body.
        Respond(u16, Bytes),
        /// Fails at the transport level.
        Fail(ImageError),
    }

    /// Mock fetcher counting calls per URL.
    ///
    /// When gated, every request waits for [`MockImageFetcher::release`]
    /// before replying. Unknown URLs get a 404.
    pub struct MockImageFetcher {
        replies: Mutex<HashMap<String, MockReply>>,
        calls: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockImageFetcher {
        /// Creates a mock that replies immediately.
        pub fn new() -> Self {
            Self {
                replies: Mutex::new(HashMap::new()),
                calls: Mutex::new(HashMap::new()),
                total: AtomicUsize::new(0),
                gate: None,
            }
        }

        /// Creates a mock whose requests block until released.
        pub fn gated() -> Self {
            Self {
                gate: Some(Arc::new(Semaphore::new(0))),
                ..Self::new()
            }
        }

        /// Registers a reply for `url`.
        pub fn reply(&self, url: &str, reply: MockReply) {
            self.replies.lock().insert(url.to_string(), reply);
        }

        /// Registers a 200 response carrying `body`.
        pub fn ok(&self, url: &str, body: Bytes) {
            self.reply(url, MockReply::Respond(200, body));
        }

        /// Lets `n` gated requests proceed.
        pub fn release(&self, n: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(n);
            }
        }

        /// Number of requests issued for `url`.
        pub fn calls(&self, url: &str) -> usize {
            self.calls.lock().get(url).copied().unwrap_or(0)
        }

        /// Number of requests issued overall.
        pub fn total_calls(&self) -> usize {
            self.total.load(Ordering::SeqCst)
        }
    }

    impl Default for MockImageFetcher {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ImageFetcherPort for MockImageFetcher {
        async fn get(&self, url: &Url) -> Result<FetchResponse, ImageError> {
            *self.calls.lock().entry(url.to_string()).or_default() += 1;
            self.total.fetch_add(1, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|e| ImageError::transport(e.to_string()))?;
                permit.forget();
            }

            let reply = self.replies.lock().get(url.as_str()).cloned();
            match reply {
                Some(MockReply::Respond(status, body)) => Ok(FetchResponse { status, body }),
                Some(MockReply::Fail(error)) => Err(error),
                None => Ok(FetchResponse {
                    status: 404,
                    body: Bytes::new(),
                }),
            }
        }
    }
}
