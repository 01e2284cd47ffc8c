//! Shared HTTP client.
//!
//! Wraps reqwest with the launcher's user agent and timeouts, and turns
//! rate-limit and server-side failures into retryable [`FirmataError`]s.

use crate::config::NetworkConfig;
use crate::network::retry::{status_error, RetryPolicy};
use crate::{FirmataError, Result};
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// HTTP client used for release metadata and artifact downloads.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a client with a custom overall request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(NetworkConfig::REQUEST_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| FirmataError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: Some(e.to_string()),
            })?;

        Ok(Self {
            client,
            retry: RetryPolicy::default().with_max_attempts(NetworkConfig::MAX_RETRIES),
            timeout,
        })
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Overall request timeout this client was built with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET a URL, returning the response only for a success status.
    ///
    /// Transient failures (connection errors, 5xx, 429) are retried.
    pub async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response> {
        self.retry
            .run(&format!("GET {}", url), || self.get_once(url, headers))
            .await
    }

    /// GET a URL and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, headers: &[(&str, &str)]) -> Result<T> {
        let response = self.get(url, headers).await?;
        response.json::<T>().await.map_err(|e| FirmataError::Json {
            message: format!("Failed to decode response from {}: {}", url, e),
            source: None,
        })
    }

    async fn get_once(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response> {
        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FirmataError::Timeout(self.timeout)
            } else {
                FirmataError::Network {
                    message: format!("GET {} failed: {}", url, e),
                    cause: Some(e.to_string()),
                }
            }
        })?;

        let status = response.status();
        debug!("GET {} -> {}", url, status);

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(FirmataError::RateLimited {
                service: extract_domain(url),
                retry_after_secs: retry_after,
            });
        }

        Err(status_error(url, status))
    }
}

/// Extract the host name from a URL, for error messages.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}
