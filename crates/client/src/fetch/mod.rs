//! HTTP fetch layer used by the offline cache controller.
//!
//! ### Failure model
//! - Only transport failures (DNS, connect, TLS, timeout, oversized body)
//!   are errors. Any HTTP status, 404 and 500 included, is a response.
//! - Redirects are followed (max 5). A response whose final URL left the
//!   request origin is typed `cors` and is never stored.
//!
//! ### Limits
//! - Max body bytes: 5MB (configurable)
//! - Request timeout: 20s (configurable)

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, header};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonicalize, resolve, same_origin};

use offcache_core::{Error, ResponseType, StoredResponse};

/// Network side of the controller.
///
/// Implementations resolve with a response for any HTTP status and fail
/// only when no response could be obtained.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &::url::Url) -> Result<StoredResponse, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "offcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "offcache/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl FetchConfig {
    /// Fetch settings from application configuration.
    pub fn from_app(config: &offcache_core::AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// reqwest-backed [`Fetcher`].
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    async fn fetch(&self, url: &::url::Url) -> Result<StoredResponse, Error> {
        let start = Instant::now();

        let response = self.http.get(url.as_str()).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Network(format!("timeout fetching {url}"))
            } else {
                Error::Network(format!("network error: {}", e))
            }
        })?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let status = response.status();
        let final_url = response.url().clone();
        let response_type = if same_origin(&final_url, url) { ResponseType::Basic } else { ResponseType::Cors };
        let headers = collect_headers(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {}", e)))?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", body.len(), self.config.max_bytes)));
        }

        tracing::debug!(
            "fetched {} -> {} status {} in {}ms ({} bytes)",
            url,
            final_url,
            status.as_u16(),
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(StoredResponse { url: final_url.into(), status: status.as_u16(), response_type, headers, body })
    }
}

fn collect_headers(headers: &header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect()
}
