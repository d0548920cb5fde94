//! Fetch interception.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use offcache_client::{Fetcher, same_origin};
use offcache_core::{CacheKey, CacheStore, Policy, StoredResponse};

use super::CacheController;

/// An outbound request from the application.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub url: Url,
}

impl FetchRequest {
    /// The method is upper-cased.
    pub fn new(method: &str, url: Url) -> Self {
        Self { method: method.trim().to_ascii_uppercase(), url }
    }

    #[cfg(test)]
    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServedFrom {
    Network,
    Cache,
    /// The cached shell document, served because nothing better was available.
    Fallback,
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Not intercepted; the caller performs a plain network fetch.
    Passthrough,
    Served { response: StoredResponse, source: ServedFrom },
    /// Network failed and no cached copy exists.
    NetworkError(String),
}

impl<S: CacheStore, F: Fetcher> CacheController<S, F> {
    /// Mediate one request.
    ///
    /// Requests that are not same-origin GETs inside the scope, or that
    /// arrive while this version is not activated, pass through untouched.
    pub async fn handle(&self, request: &FetchRequest) -> FetchOutcome {
        if !self.state().await.can_intercept_fetch() {
            return FetchOutcome::Passthrough;
        }

        let url = &request.url;
        let classifier = &self.settings.classifier;
        if !request.is_get() || !same_origin(url, &self.settings.origin) || !classifier.in_scope(url.path()) {
            return FetchOutcome::Passthrough;
        }

        let class = classifier.classify(url.path());
        let key = CacheKey::for_request(url, class, classifier);
        tracing::debug!(url = %url, class = %class, "intercepted fetch");

        match class.policy() {
            Policy::Passthrough => FetchOutcome::Passthrough,
            Policy::NetworkFirst => self.network_first(url, key).await,
            Policy::CacheFirst => self.cache_first(url, key).await,
        }
    }

    async fn network_first(&self, url: &Url, key: CacheKey) -> FetchOutcome {
        match self.fetcher.fetch(url).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.cache_store(key, response.clone()).await;
                }
                FetchOutcome::Served { response, source: ServedFrom::Network }
            }
            Err(e) => match self.cache_lookup(&key).await {
                Some(response) => {
                    tracing::debug!(url = %url, error = %e, "network failed; serving cached copy");
                    FetchOutcome::Served { response, source: ServedFrom::Cache }
                }
                None => FetchOutcome::NetworkError(e.to_string()),
            },
        }
    }

    async fn cache_first(&self, url: &Url, key: CacheKey) -> FetchOutcome {
        if let Some(response) = self.cache_lookup(&key).await {
            tracing::debug!(url = %url, "cache hit");
            return FetchOutcome::Served { response, source: ServedFrom::Cache };
        }

        match self.fetcher.fetch(url).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.cache_store(key, response.clone()).await;
                }
                FetchOutcome::Served { response, source: ServedFrom::Network }
            }
            Err(e) => {
                let shell = CacheKey::shell(&self.settings.classifier);
                match self.cache_lookup(&shell).await {
                    Some(response) => {
                        tracing::debug!(url = %url, error = %e, "network failed; serving shell document");
                        FetchOutcome::Served { response, source: ServedFrom::Fallback }
                    }
                    None => FetchOutcome::NetworkError(e.to_string()),
                }
            }
        }
    }
}
