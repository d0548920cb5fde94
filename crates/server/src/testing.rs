//! Test doubles shared by the controller, registration and tool tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use offcache_client::Fetcher;
use offcache_core::{Classifier, Error, ResponseType, StoredResponse};

use crate::controller::{ControllerSettings, WorkerVersion};

pub const ORIGIN: &str = "https://example.com";

pub fn settings() -> ControllerSettings {
    ControllerSettings {
        origin: Url::parse(ORIGIN).unwrap(),
        classifier: Classifier::new("/app/", "sw.js"),
        sync_tag: "sync-messages".into(),
    }
}

pub fn manifest() -> Vec<String> {
    ["/app/", "/app/index.html", "/app/app.js", "/app/data/users.json"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn version(tag: &str) -> WorkerVersion {
    WorkerVersion { tag: tag.into(), manifest: manifest() }
}

pub fn ok(url: &str, body: &str) -> StoredResponse {
    StoredResponse {
        url: url.to_string(),
        status: 200,
        response_type: ResponseType::Basic,
        headers: vec![("content-type".into(), "text/plain".into())],
        body: Bytes::from(body.to_string()),
    }
}

/// Scripted network: path -> response, with an offline switch.
#[derive(Default)]
pub struct FakeFetcher {
    routes: Mutex<HashMap<String, StoredResponse>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl FakeFetcher {
    /// Serves every path of [`manifest`] with a body naming the path and `label`.
    pub fn serving_manifest(label: &str) -> Self {
        let fetcher = Self::default();
        for path in manifest() {
            fetcher.route(&path, 200, &format!("{label}:{path}"));
        }
        fetcher
    }

    pub fn route(&self, path: &str, status: u16, body: &str) {
        let mut response = ok(&format!("{ORIGIN}{path}"), body);
        response.status = status;
        self.routes.lock().unwrap().insert(path.to_string(), response);
    }

    pub fn route_response(&self, path: &str, response: StoredResponse) {
        self.routes.lock().unwrap().insert(path.to_string(), response);
    }

    pub fn unroute(&self, path: &str) {
        self.routes.lock().unwrap().remove(path);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &Url) -> Result<StoredResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {url}")));
        }
        let routes = self.routes.lock().unwrap();
        Ok(routes.get(url.path()).cloned().unwrap_or_else(|| {
            let mut missing = ok(url.as_str(), "not found");
            missing.status = 404;
            missing
        }))
    }
}
