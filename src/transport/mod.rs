//! HTTP transport for index servers and archive storage
//!
//! This module handles every outbound request, including:
//! - Building the shared HTTP client
//! - Rotating the client identity per attempt
//! - Classifying overload statuses (500/503) as retryable
//! - Bounded retries with a linear backoff tied to the request timeout
//!
//! # Status handling
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 500 | Overloaded, sleep `timeout`, retry |
//! | HTTP 503 | Unavailable, sleep `timeout`, retry |
//! | Non-empty body, any other status | Returned as data (e.g. 206 range reads) |
//! | Empty body, non-200 status | Attempt failed, retry immediately |
//! | Empty body, HTTP 200 | Surfaced immediately as `EmptyBody` |
//! | Network error or timeout | Attempt failed, retry immediately |

mod user_agent;

pub use user_agent::random_user_agent;

use crate::{HarvestError, Result};
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Builds the HTTP client shared by all archive sources
///
/// Per-request timeouts are applied on each request, so the client itself
/// only bounds connection setup.
pub fn build_http_client() -> std::result::Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs GET requests with retry and backoff
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
}

impl Transport {
    /// Creates a transport with a freshly built client
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(build_http_client()?))
    }

    /// Creates a transport around an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Fetches a URL, retrying up to `retries` attempts
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    /// * `timeout` - Round-trip timeout per attempt, also the backoff after a 500/503
    /// * `retries` - Total number of attempts (0 is treated as 1)
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)` - The response body
    /// * `Err(HarvestError::RetriesExhausted)` - Every attempt failed, wraps the last cause
    /// * `Err(HarvestError::EmptyBody)` - The server answered 200 with nothing
    pub async fn get(&self, url: &str, timeout: Duration, retries: u32) -> Result<Vec<u8>> {
        self.get_with_headers(url, timeout, retries, &[]).await
    }

    /// Same as [`Transport::get`], with extra request headers on every attempt
    pub async fn get_with_headers(
        &self,
        url: &str,
        timeout: Duration,
        retries: u32,
        headers: &[(&str, String)],
    ) -> Result<Vec<u8>> {
        let attempts = retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::debug!(
                "GET [t={}s] [r={}/{}]: {}",
                timeout.as_secs_f32(),
                attempt,
                attempts,
                url
            );

            let error = match self.do_request(url, timeout, headers).await {
                Ok(body) => return Ok(body),
                Err(e @ HarvestError::EmptyBody { .. }) => return Err(e),
                Err(e) => e,
            };

            if attempt >= attempts {
                return Err(HarvestError::RetriesExhausted {
                    url: url.to_string(),
                    attempts,
                    source: Box::new(error),
                });
            }

            if error.is_retryable() {
                tracing::warn!("{}; backing off for {:?}", error, timeout);
                tokio::time::sleep(timeout).await;
            } else {
                tracing::debug!("Attempt {} failed: {}", attempt, error);
            }
        }
    }

    /// Performs a single GET attempt
    ///
    /// The timeout covers the whole round trip, body included.
    pub async fn do_request(
        &self,
        url: &str,
        timeout: Duration,
        headers: &[(&str, String)],
    ) -> Result<Vec<u8>> {
        let mut request = self
            .client
            .get(url)
            .timeout(timeout)
            .header(USER_AGENT, random_user_agent());
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request.send().await.map_err(|e| classify(url, e))?;
        let status = response.status();

        match status {
            StatusCode::INTERNAL_SERVER_ERROR => {
                return Err(HarvestError::Overloaded {
                    url: url.to_string(),
                })
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                return Err(HarvestError::Unavailable {
                    url: url.to_string(),
                })
            }
            _ => {}
        }

        let body = response.bytes().await.map_err(|e| classify(url, e))?;
        if !body.is_empty() {
            return Ok(body.to_vec());
        }

        if status != StatusCode::OK {
            return Err(HarvestError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Err(HarvestError::EmptyBody {
            url: url.to_string(),
        })
    }
}

fn classify(url: &str, error: reqwest::Error) -> HarvestError {
    if error.is_timeout() {
        HarvestError::Timeout {
            url: url.to_string(),
        }
    } else {
        HarvestError::Http {
            url: url.to_string(),
            source: error,
        }
    }
}
