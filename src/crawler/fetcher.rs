//! HTTP fetcher implementation
//!
//! This module handles the HTTP side of a crawl run:
//! - Building HTTP clients with the job's user agent and timeouts
//! - GET requests for content pages
//! - Error classification into per-page fetch failures

use crate::CrawlError;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Upper bound on the connect phase, regardless of the request timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Redirect hops followed before a fetch fails
const MAX_REDIRECTS: usize = 10;

/// Builds an HTTP client for one job
///
/// # Arguments
///
/// * `user_agent` - The job's user agent string
/// * `timeout` - Total time allowed for a single request
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(CONNECT_TIMEOUT))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Source of page markup for the dispatcher
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url` and returns its undecoded body
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CrawlError>;
}

/// Fetches pages over HTTP
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CrawlError> {
        let fetch_error = |message: String| CrawlError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                fetch_error("request timed out".to_string())
            } else {
                fetch_error(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.is_empty() && !content_type.contains("html") {
            return Err(fetch_error(format!("expected HTML, got {}", content_type)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        Ok(body.to_vec())
    }
}
