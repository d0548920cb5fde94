//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFCACHE_*)
//! 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFCACHE_*)
/// 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via OFFCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the packaged application, e.g. `https://example.com`.
    ///
    /// Only same-origin requests are ever intercepted.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Path prefix governed by the controller. Must start and end with `/`.
    ///
    /// The shell document lives at `{scope}` and `{scope}index.html`.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Version tag of the cache generation baked into this deployment.
    ///
    /// Bumping it is the only way to invalidate previously cached entries.
    #[serde(default = "default_generation_tag")]
    pub generation_tag: String,

    /// Same-origin paths fetched and stored at install time.
    ///
    /// Set via OFFCACHE_INSTALL_MANIFEST, e.g. `["/app/","/app/app.js"]`.
    #[serde(default = "default_install_manifest")]
    pub install_manifest: Vec<String>,

    /// File name of the worker script, always passed through to the network.
    #[serde(default = "default_worker_script")]
    pub worker_script: String,

    /// Promote a freshly installed generation without waiting for open
    /// sessions of the previous one to close.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    /// Background sync tag that triggers the sync routine.
    #[serde(default = "default_sync_tag")]
    pub sync_tag: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via OFFCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via OFFCACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via OFFCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offcache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_scope() -> String {
    "/app/".into()
}

fn default_generation_tag() -> String {
    "v1".into()
}

fn default_install_manifest() -> Vec<String> {
    [
        "/app/",
        "/app/index.html",
        "/app/styles.css",
        "/app/app.js",
        "/app/data/users.json",
        "/app/manifest.json",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_worker_script() -> String {
    "sw.js".into()
}

fn default_sync_tag() -> String {
    "sync-messages".into()
}

fn default_user_agent() -> String {
    "offcache/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            scope: default_scope(),
            generation_tag: default_generation_tag(),
            install_manifest: default_install_manifest(),
            worker_script: default_worker_script(),
            skip_waiting: true,
            sync_tag: default_sync_tag(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parsed application origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme: {other}") }),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFCACHE_`
    /// 2. TOML file from `OFFCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
