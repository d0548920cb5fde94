//! Registration: the owner of active and waiting controller versions.
//!
//! A new version is installed alongside the active one. It takes over
//! immediately when `skip_waiting` is set (or nothing is active), otherwise
//! it waits until `skip_waiting()` is called or the last open session closes.
//! A version that fails to install never touches the active one.
//! Generations stored by an earlier run are resumed without the network.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use offcache_client::Fetcher;
use offcache_core::{CacheStore, Error, cache::GenerationInfo};

use crate::clients::{ClientId, ClientRegistry, ClientSession, Notification};
use crate::controller::{CacheController, ControllerSettings, FetchOutcome, FetchRequest, WorkerState, WorkerVersion};

/// Result of registering a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegisterOutcome {
    /// Same tag as the active (or waiting) version; nothing was done.
    Unchanged { tag: String },
    /// Installed and parked until promoted.
    Waiting { tag: String, entries: usize },
    /// Installed and now serving.
    Activated { tag: String, entries: usize, deleted: Vec<String>, claimed: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkerSummary {
    pub tag: String,
    pub state: WorkerState,
    pub entries: Option<usize>,
}

/// Point-in-time view of the registration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RegistrationStatus {
    pub scope: String,
    pub active: Option<WorkerSummary>,
    pub waiting: Option<WorkerSummary>,
    pub generations: Vec<GenerationInfo>,
    pub clients: Vec<ClientSession>,
    pub notifications: Vec<Notification>,
}

type Slot<S, F> = RwLock<Option<Arc<CacheController<S, F>>>>;

pub struct Registration<S: CacheStore, F: Fetcher> {
    settings: Arc<ControllerSettings>,
    store: Arc<S>,
    fetcher: Arc<F>,
    skip_waiting: bool,
    active: Slot<S, F>,
    waiting: Slot<S, F>,
    clients: ClientRegistry,
    /// Serializes register/promote so two versions never install or
    /// activate at once.
    lifecycle: Mutex<()>,
}

impl<S: CacheStore, F: Fetcher> Registration<S, F> {
    pub fn new(settings: ControllerSettings, store: Arc<S>, fetcher: Arc<F>, skip_waiting: bool) -> Self {
        Self {
            settings: Arc::new(settings),
            store,
            fetcher,
            skip_waiting,
            active: RwLock::new(None),
            waiting: RwLock::new(None),
            clients: ClientRegistry::new(),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub async fn active(&self) -> Option<Arc<CacheController<S, F>>> {
        self.active.read().await.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<CacheController<S, F>>> {
        self.waiting.read().await.clone()
    }

    async fn require_active(&self) -> Result<Arc<CacheController<S, F>>, Error> {
        self.active()
            .await
            .ok_or_else(|| Error::InvalidState { expected: "an activated version".into(), actual: "none".into() })
    }

    /// Install `version` and, per the promotion rules, activate it.
    ///
    /// A generation already stored under the version's tag (from an earlier
    /// run) is resumed rather than seeded again, so no network is needed.
    ///
    /// # Errors
    ///
    /// Install errors are returned as-is; the active version and the stored
    /// generations are left exactly as they were. When nothing was active,
    /// the newest stored generation is activated before the error returns.
    pub async fn register(&self, version: WorkerVersion) -> Result<RegisterOutcome, Error> {
        let _guard = self.lifecycle.lock().await;

        if let Some(active) = self.active().await
            && active.tag() == version.tag
        {
            tracing::debug!(tag = %version.tag, "version already active");
            return Ok(RegisterOutcome::Unchanged { tag: version.tag });
        }
        if let Some(waiting) = self.waiting().await
            && waiting.tag() == version.tag
        {
            return Ok(RegisterOutcome::Unchanged { tag: version.tag });
        }

        let controller =
            Arc::new(CacheController::new(self.settings.clone(), version, self.store.clone(), self.fetcher.clone()));
        let entries = match self.prepare(&controller).await {
            Ok(entries) => entries,
            Err(e) => {
                if self.active().await.is_none() {
                    self.restore_latest(controller.version()).await;
                }
                return Err(e);
            }
        };
        let tag = controller.tag().to_string();

        if self.skip_waiting || self.active().await.is_none() {
            let report = self.promote(controller).await?;
            return Ok(RegisterOutcome::Activated { tag, entries, deleted: report.deleted, claimed: report.claimed });
        }

        if let Some(previous) = self.waiting.write().await.replace(controller) {
            previous.mark_redundant().await;
        }
        tracing::info!(tag = %tag, "version installed; waiting for open sessions to close");
        Ok(RegisterOutcome::Waiting { tag, entries })
    }

    async fn prepare(&self, controller: &CacheController<S, F>) -> Result<usize, Error> {
        let stored = self
            .store
            .generations()
            .await?
            .into_iter()
            .any(|info| info.tag == controller.tag() && info.entries > 0);
        if stored { controller.resume().await } else { controller.install().await }
    }

    /// Activate the newest non-empty stored generation other than `failed`.
    /// Returns its tag when one was restored.
    async fn restore_latest(&self, failed: &WorkerVersion) -> Option<String> {
        let latest = match self.store.generations().await {
            Ok(generations) => generations
                .into_iter()
                .rev()
                .find(|info| info.entries > 0 && info.tag != failed.tag)?,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list stored generations");
                return None;
            }
        };

        let version = WorkerVersion { tag: latest.tag, manifest: failed.manifest.clone() };
        let controller =
            Arc::new(CacheController::new(self.settings.clone(), version, self.store.clone(), self.fetcher.clone()));
        let tag = controller.tag().to_string();
        let restored = match controller.resume().await {
            Ok(_) => self.promote(controller).await.map(|_| ()),
            Err(e) => Err(e),
        };
        match restored {
            Ok(()) => {
                tracing::info!(tag = %tag, failed = %failed.tag, "install failed; serving stored generation");
                Some(tag)
            }
            Err(e) => {
                tracing::warn!(tag = %tag, error = %e, "failed to restore stored generation");
                None
            }
        }
    }

    async fn promote(
        &self, controller: Arc<CacheController<S, F>>,
    ) -> Result<crate::controller::ActivationReport, Error> {
        let report = controller.activate(&self.clients).await?;
        if let Some(previous) = self.active.write().await.replace(controller) {
            previous.mark_redundant().await;
        }
        Ok(report)
    }

    async fn promote_waiting(&self) -> Result<Option<String>, Error> {
        let Some(controller) = self.waiting.write().await.take() else {
            return Ok(None);
        };
        let tag = controller.tag().to_string();
        if let Err(e) = self.promote(controller.clone()).await {
            *self.waiting.write().await = Some(controller);
            return Err(e);
        }
        Ok(Some(tag))
    }

    /// Promote the waiting version now. Returns its tag, if one was waiting.
    pub async fn skip_waiting(&self) -> Result<Option<String>, Error> {
        let _guard = self.lifecycle.lock().await;
        self.promote_waiting().await
    }

    /// Route a request through the active version.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        match self.active().await {
            Some(controller) => controller.handle(request).await,
            None => FetchOutcome::Passthrough,
        }
    }

    /// Open a session; it is controlled by the active version, if any.
    pub async fn open_client(&self, url: &str) -> ClientSession {
        let active = self.active().await;
        self.clients.open_window(url, active.as_ref().map(|c| c.tag())).await
    }

    /// Close a session. Closing the last one promotes a waiting version,
    /// whose tag is returned alongside the closed session.
    pub async fn close_client(&self, id: ClientId) -> Result<(Option<ClientSession>, Option<String>), Error> {
        let _guard = self.lifecycle.lock().await;
        let closed = self.clients.close(id).await;
        if closed.is_some() && self.clients.is_empty().await {
            let promoted = self.promote_waiting().await?;
            return Ok((closed, promoted));
        }
        Ok((closed, None))
    }

    pub async fn push(&self, payload: Option<&[u8]>) -> Result<Notification, Error> {
        let controller = self.require_active().await?;
        Ok(controller.on_push(payload, &self.clients).await)
    }

    pub async fn notification_click(&self, id: u64) -> Result<ClientSession, Error> {
        let controller = self.require_active().await?;
        controller.on_notification_click(id, &self.clients).await
    }

    pub async fn sync(&self, tag: &str) -> Result<bool, Error> {
        let controller = self.require_active().await?;
        Ok(controller.on_sync(tag).await)
    }

    pub async fn status(&self) -> Result<RegistrationStatus, Error> {
        async fn summary<S: CacheStore, F: Fetcher>(c: Option<Arc<CacheController<S, F>>>) -> Option<WorkerSummary> {
            let c = c?;
            Some(WorkerSummary { tag: c.tag().to_string(), state: c.state().await, entries: c.entry_count().await })
        }

        Ok(RegistrationStatus {
            scope: self.settings.scope_url(),
            active: summary(self.active().await).await,
            waiting: summary(self.waiting().await).await,
            generations: self.store.generations().await?,
            clients: self.clients.sessions().await,
            notifications: self.clients.notifications().await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ServedFrom;
    use crate::testing::{self, FakeFetcher, ORIGIN, version};
    use bytes::Bytes;
    use offcache_core::{CacheDb, MemoryStore};
    use url::Url;

    fn registration<S: CacheStore>(
        store: Arc<S>, fetcher: Arc<FakeFetcher>, skip_waiting: bool,
    ) -> Registration<S, FakeFetcher> {
        Registration::new(testing::settings(), store, fetcher, skip_waiting)
    }

    fn get(path: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(&format!("{ORIGIN}{path}")).unwrap())
    }

    fn body(outcome: FetchOutcome) -> Bytes {
        match outcome {
            FetchOutcome::Served { response, .. } => response.body,
            other => panic!("expected a served response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generation_rollover_scenario() {
        let store = Arc::new(CacheDb::open_in_memory().await.unwrap());
        let fetcher = Arc::new(FakeFetcher::serving_manifest("v5"));
        let reg = registration(store.clone(), fetcher.clone(), true);

        // (a) first load: everything seeded, shell reachable via `/app/`.
        let outcome = reg.register(version("v5")).await.unwrap();
        assert!(matches!(outcome, RegisterOutcome::Activated { ref tag, entries: 4, .. } if tag == "v5"));

        // (b) offline: app.js comes from v5 with install-time bytes.
        fetcher.set_offline(true);
        assert_eq!(body(reg.fetch(&get("/app/app.js")).await), Bytes::from("v5:/app/app.js"));
        assert_eq!(body(reg.fetch(&get("/app/")).await), Bytes::from("v5:/app/index.html"));

        // (c) deploy v6; v5 disappears, v6 serves its own copy offline.
        fetcher.set_offline(false);
        for path in testing::manifest() {
            fetcher.route(&path, 200, &format!("v6:{path}"));
        }
        let outcome = reg.register(version("v6")).await.unwrap();
        assert!(matches!(outcome, RegisterOutcome::Activated { ref deleted, .. } if deleted == &vec!["v5".to_string()]));

        let tags: Vec<String> = store.generations().await.unwrap().into_iter().map(|g| g.tag).collect();
        assert_eq!(tags, vec!["v6"]);

        fetcher.set_offline(true);
        match reg.fetch(&get("/app/app.js")).await {
            FetchOutcome::Served { response, source } => {
                assert_eq!(source, ServedFrom::Cache);
                assert_eq!(response.body, Bytes::from("v6:/app/app.js"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_generation() {
        let store = Arc::new(CacheDb::open_in_memory().await.unwrap());
        let fetcher = Arc::new(FakeFetcher::serving_manifest("v5"));
        let reg = registration(store.clone(), fetcher.clone(), true);
        reg.register(version("v5")).await.unwrap();

        fetcher.unroute("/app/app.js");
        let err = reg.register(version("v6")).await.unwrap_err();
        assert!(matches!(err, Error::InstallFailed { .. }));

        let active = reg.active().await.unwrap();
        assert_eq!(active.tag(), "v5");
        assert_eq!(active.state().await, WorkerState::Activated);
        let tags: Vec<String> = store.generations().await.unwrap().into_iter().map(|g| g.tag).collect();
        assert_eq!(tags, vec!["v5"]);

        fetcher.set_offline(true);
        assert_eq!(body(reg.fetch(&get("/app/app.js")).await), Bytes::from("v5:/app/app.js"));
    }

    #[tokio::test]
    async fn test_same_tag_is_unchanged() {
        let fetcher = Arc::new(FakeFetcher::serving_manifest("v1"));
        let reg = registration(Arc::new(MemoryStore::new()), fetcher.clone(), true);
        reg.register(version("v1")).await.unwrap();
        let calls = fetcher.calls();

        let outcome = reg.register(version("v1")).await.unwrap();
        assert_eq!(outcome, RegisterOutcome::Unchanged { tag: "v1".into() });
        assert_eq!(fetcher.calls(), calls);
    }

    #[tokio::test]
    async fn test_waiting_until_last_client_closes() {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(FakeFetcher::serving_manifest("x"));
        let reg = registration(store.clone(), fetcher, false);

        reg.register(version("v1")).await.unwrap();
        let session = reg.open_client("https://example.com/app/").await;
        assert_eq!(session.controller.as_deref(), Some("v1"));

        let outcome = reg.register(version("v2")).await.unwrap();
        assert!(matches!(outcome, RegisterOutcome::Waiting { ref tag, .. } if tag == "v2"));
        assert_eq!(reg.active().await.unwrap().tag(), "v1");
        assert_eq!(store.generations().await.unwrap().len(), 2);

        let (closed, promoted) = reg.close_client(session.id).await.unwrap();
        assert!(closed.is_some());
        assert_eq!(promoted.as_deref(), Some("v2"));
        assert_eq!(reg.active().await.unwrap().tag(), "v2");
        assert!(reg.waiting().await.is_none());
        assert_eq!(store.generations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_skip_waiting_promotes_and_claims() {
        let fetcher = Arc::new(FakeFetcher::serving_manifest("x"));
        let reg = registration(Arc::new(MemoryStore::new()), fetcher, false);
        reg.register(version("v1")).await.unwrap();
        let old = reg.active().await.unwrap();
        reg.open_client("https://example.com/app/").await;
        reg.register(version("v2")).await.unwrap();

        assert_eq!(reg.skip_waiting().await.unwrap().as_deref(), Some("v2"));
        assert_eq!(old.state().await, WorkerState::Redundant);
        assert!(reg.clients().sessions().await.iter().all(|s| s.controller.as_deref() == Some("v2")));
        assert_eq!(reg.skip_waiting().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_no_active_version_passes_through() {
        let fetcher = Arc::new(FakeFetcher::serving_manifest("x"));
        let reg = registration(Arc::new(MemoryStore::new()), fetcher, true);

        assert!(matches!(reg.fetch(&get("/app/")).await, FetchOutcome::Passthrough));
        assert!(matches!(reg.push(None).await, Err(Error::InvalidState { .. })));
        assert!(matches!(reg.sync("sync-messages").await, Err(Error::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let fetcher = Arc::new(FakeFetcher::serving_manifest("x"));
        let reg = registration(Arc::new(MemoryStore::new()), fetcher, true);
        reg.register(version("v3")).await.unwrap();
        reg.push(None).await.unwrap();

        let status = reg.status().await.unwrap();
        assert_eq!(status.scope, "https://example.com/app/");
        let active = status.active.unwrap();
        assert_eq!(active.tag, "v3");
        assert_eq!(active.state, WorkerState::Activated);
        assert_eq!(active.entries, Some(3));
        assert!(status.waiting.is_none());
        assert_eq!(status.generations.len(), 1);
        assert_eq!(status.notifications.len(), 1);
    }

    #[tokio::test]
    async fn test_restart_resumes_stored_generation_offline() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("offcache.sqlite");
        let fetcher = Arc::new(FakeFetcher::serving_manifest("v5"));

        let first = registration(Arc::new(CacheDb::open(&path).await.unwrap()), fetcher.clone(), true);
        first.register(version("v5")).await.unwrap();
        drop(first);

        fetcher.set_offline(true);
        let store = Arc::new(CacheDb::open(&path).await.unwrap());
        let reg = registration(store.clone(), fetcher.clone(), true);
        let outcome = reg.register(version("v5")).await.unwrap();
        assert!(matches!(outcome, RegisterOutcome::Activated { ref tag, entries: 3, .. } if tag == "v5"));

        match reg.fetch(&get("/app/app.js")).await {
            FetchOutcome::Served { response, source } => {
                assert_eq!(source, ServedFrom::Cache);
                assert_eq!(response.body, Bytes::from("v5:/app/app.js"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(body(reg.fetch(&get("/app/")).await), Bytes::from("v5:/app/index.html"));
        assert_eq!(store.generations().await.unwrap(), vec![GenerationInfo { tag: "v5".into(), entries: 3 }]);
    }

    #[tokio::test]
    async fn test_restart_with_failing_new_version_serves_stored_generation() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("offcache.sqlite");
        let fetcher = Arc::new(FakeFetcher::serving_manifest("v5"));

        let first = registration(Arc::new(CacheDb::open(&path).await.unwrap()), fetcher.clone(), true);
        first.register(version("v5")).await.unwrap();
        drop(first);

        fetcher.set_offline(true);
        let store = Arc::new(CacheDb::open(&path).await.unwrap());
        let reg = registration(store.clone(), fetcher.clone(), true);
        let err = reg.register(version("v6")).await.unwrap_err();
        assert!(matches!(err, Error::InstallFailed { .. }));

        let active = reg.active().await.unwrap();
        assert_eq!(active.tag(), "v5");
        assert_eq!(active.state().await, WorkerState::Activated);
        assert_eq!(body(reg.fetch(&get("/app/data/users.json")).await), Bytes::from("v5:/app/data/users.json"));

        // Back online, the new version installs and replaces the restored one.
        fetcher.set_offline(false);
        let outcome = reg.register(version("v6")).await.unwrap();
        assert!(matches!(outcome, RegisterOutcome::Activated { ref deleted, .. } if deleted == &vec!["v5".to_string()]));
    }

    #[tokio::test]
    async fn test_failed_install_with_empty_store_stays_inactive() {
        let fetcher = Arc::new(FakeFetcher::serving_manifest("v1"));
        fetcher.set_offline(true);
        let reg = registration(Arc::new(MemoryStore::new()), fetcher, true);

        assert!(reg.register(version("v1")).await.is_err());
        assert!(reg.active().await.is_none());
        assert!(matches!(reg.fetch(&get("/app/")).await, FetchOutcome::Passthrough));
    }
}
