//! HTTP transport for image downloads.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use tracing::{debug, trace};

use crate::domain::errors::ImageError;
use crate::domain::ports::{FetchResponse, ImageFetcherPort};

/// Fetches image payloads with a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    /// Creates a fetcher with the given request timeout and user agent.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, ImageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ImageError::transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn map_transport_error(error: &reqwest::Error) -> ImageError {
    if error.is_timeout() {
        ImageError::Timeout
    } else {
        ImageError::transport(error.to_string())
    }
}

#[async_trait]
impl ImageFetcherPort for HttpImageFetcher {
    async fn get(&self, url: &Url) -> Result<FetchResponse, ImageError> {
        trace!(url = %url, "Sending image request");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(
                url = %url,
                status = status.as_u16(),
                reason = status.canonical_reason().unwrap_or("Unknown"),
                "Image request rejected"
            );
            return Ok(FetchResponse {
                status: status.as_u16(),
                body: Bytes::new(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(&e))?;

        Ok(FetchResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_creation() {
        let fetcher = HttpImageFetcher::new(Duration::from_secs(5), "feedimg-test");
        assert!(fetcher.is_ok());
    }

    #[test]
    fn test_success_range() {
        let ok = FetchResponse {
            status: 204,
            body: Bytes::new(),
        };
        let redirect = FetchResponse {
            status: 304,
            body: Bytes::new(),
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }
}
