//! sw_fetch tool implementation.
//!
//! Routes a request through the active version, exactly as the application
//! would see it. Requests the controller declines are fetched straight from
//! the network when they are GETs.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offcache_client::{Fetcher, resolve};
use offcache_core::{CacheStore, Error, StoredResponse};

use super::json_result;
use crate::controller::{FetchOutcome, FetchRequest, ServedFrom};
use crate::registration::Registration;

/// Parameters for the sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// Absolute URL, or a path resolved against the application origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "GET".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResponseSummary {
    pub status: u16,
    pub response_type: String,
    pub content_type: Option<String>,
    /// Body decoded as UTF-8 (lossy).
    pub body: String,
    pub bytes: usize,
}

impl From<&StoredResponse> for ResponseSummary {
    fn from(response: &StoredResponse) -> Self {
        Self {
            status: response.status,
            response_type: response.response_type.as_str().to_string(),
            content_type: response.content_type().map(str::to_string),
            body: String::from_utf8_lossy(&response.body).into_owned(),
            bytes: response.body.len(),
        }
    }
}

/// Output from the sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchOutput {
    pub url: String,
    pub method: String,
    /// Whether the active version handled the request.
    pub intercepted: bool,
    /// Set when intercepted.
    pub served_from: Option<ServedFrom>,
    /// Absent for non-GET passthrough requests, which are not performed.
    pub response: Option<ResponseSummary>,
}

/// Implementation of the sw_fetch tool.
pub async fn fetch_impl<S: CacheStore, F: Fetcher>(
    registration: &Registration<S, F>, params: FetchParams,
) -> Result<CallToolResult, McpError> {
    if params.method.trim().is_empty() {
        return Err(Error::InvalidInput("method cannot be empty".into()).into());
    }
    let url = resolve(&registration.settings().origin, &params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    let request = FetchRequest::new(&params.method, url);
    let output = match registration.fetch(&request).await {
        FetchOutcome::Served { response, source } => FetchOutput {
            url: request.url.to_string(),
            method: request.method,
            intercepted: true,
            served_from: Some(source),
            response: Some(ResponseSummary::from(&response)),
        },
        FetchOutcome::NetworkError(message) => return Err(Error::Network(message).into()),
        FetchOutcome::Passthrough => {
            let response = if request.is_get() {
                Some(ResponseSummary::from(&registration.fetcher().fetch(&request.url).await?))
            } else {
                tracing::debug!(method = %request.method, url = %request.url, "non-GET passthrough not performed");
                None
            };
            FetchOutput {
                url: request.url.to_string(),
                method: request.method,
                intercepted: false,
                served_from: None,
                response,
            }
        }
    };

    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::tools::test_support::{output, registration};

    fn params(url: &str) -> FetchParams {
        FetchParams { url: url.into(), method: default_method() }
    }

    #[tokio::test]
    async fn test_fetch_offline_from_cache() {
        let (reg, fetcher) = registration(true);
        reg.register(testing::version("v1")).await.unwrap();
        fetcher.set_offline(true);

        let out: FetchOutput = output(&fetch_impl(&reg, params("/app/app.js")).await.unwrap());
        assert!(out.intercepted);
        assert_eq!(out.served_from, Some(ServedFrom::Cache));
        let response = out.response.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "v1:/app/app.js");
    }

    #[tokio::test]
    async fn test_fetch_worker_script_passthrough() {
        let (reg, fetcher) = registration(true);
        reg.register(testing::version("v1")).await.unwrap();
        fetcher.route("/app/sw.js", 200, "self.addEventListener()");

        let out: FetchOutput = output(&fetch_impl(&reg, params("https://example.com/app/sw.js")).await.unwrap());
        assert!(!out.intercepted);
        assert_eq!(out.response.unwrap().body, "self.addEventListener()");
    }

    #[tokio::test]
    async fn test_fetch_post_not_performed() {
        let (reg, fetcher) = registration(true);
        reg.register(testing::version("v1")).await.unwrap();
        let calls = fetcher.calls();

        let p = FetchParams { url: "/app/data/users.json".into(), method: "post".into() };
        let out: FetchOutput = output(&fetch_impl(&reg, p).await.unwrap());
        assert_eq!(out.method, "POST");
        assert!(!out.intercepted);
        assert!(out.response.is_none());
        assert_eq!(fetcher.calls(), calls);
    }

    #[tokio::test]
    async fn test_fetch_network_error_code() {
        let (reg, fetcher) = registration(true);
        reg.register(testing::version("v1")).await.unwrap();
        fetcher.set_offline(true);

        let err = fetch_impl(&reg, params("/app/data/other.json")).await.unwrap_err();
        assert_eq!(err.code.0, -32008);
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let (reg, _) = registration(true);
        let err = fetch_impl(&reg, params("ftp://example.com/x")).await.unwrap_err();
        assert_eq!(err.code.0, -32003);
    }
}
