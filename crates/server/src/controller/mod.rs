//! The offline cache controller.
//!
//! One [`CacheController`] exists per deployed version. It owns exactly one
//! cache generation (named by the version tag), seeds it from the install
//! manifest, deletes every other generation when it activates, and from then
//! on mediates same-origin GET requests:
//!
//! - scripts and data: network-first, cache on failure
//! - shell document and static assets: cache-first, network on miss, shell
//!   document as the last resort
//! - worker script and web manifest: never intercepted
//!
//! Cache read/write failures while serving are logged and treated as misses.

pub(crate) mod events;
mod fetch;
mod lifecycle;

use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};
use url::Url;

use offcache_client::{Fetcher, resolve};
use offcache_core::{
    AppConfig, CacheKey, CacheStore, Classifier, Error, GenerationInfo, GenerationStore, config::ConfigError,
};

use crate::clients::ClientRegistry;

pub use fetch::{FetchOutcome, FetchRequest, ServedFrom};
pub use lifecycle::WorkerState;

/// Settings shared by every version deployed under one scope.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub origin: Url,
    pub classifier: Classifier,
    pub sync_tag: String,
}

impl ControllerSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            origin: config.origin_url()?,
            classifier: Classifier::new(config.scope.clone(), config.worker_script.clone()),
            sync_tag: config.sync_tag.clone(),
        })
    }

    /// Absolute URL of the scope root.
    pub fn scope_url(&self) -> String {
        format!("{}{}", self.origin.origin().ascii_serialization(), self.classifier.scope())
    }
}

/// What a deployment bakes in: its generation tag and seed paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerVersion {
    pub tag: String,
    pub manifest: Vec<String>,
}

impl WorkerVersion {
    pub fn from_config(config: &AppConfig) -> Self {
        Self { tag: config.generation_tag.clone(), manifest: config.install_manifest.clone() }
    }
}

/// Outcome of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    /// Generations deleted because their tag was not ours.
    pub deleted: Vec<String>,
    /// Number of open sessions now controlled by this version.
    pub claimed: usize,
}

/// Offline cache controller for one version.
pub struct CacheController<S: CacheStore, F: Fetcher> {
    settings: Arc<ControllerSettings>,
    version: WorkerVersion,
    store: Arc<S>,
    fetcher: Arc<F>,
    generation: OnceCell<S::Generation>,
    state: RwLock<WorkerState>,
}

impl<S: CacheStore, F: Fetcher> CacheController<S, F> {
    pub fn new(settings: Arc<ControllerSettings>, version: WorkerVersion, store: Arc<S>, fetcher: Arc<F>) -> Self {
        Self { settings, version, store, fetcher, generation: OnceCell::new(), state: RwLock::new(WorkerState::Parsed) }
    }

    pub fn tag(&self) -> &str {
        &self.version.tag
    }

    pub fn version(&self) -> &WorkerVersion {
        &self.version
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write().await;
        let from = *state;
        if from != next {
            tracing::debug!(tag = %self.version.tag, from = %from, to = %next, "controller state change");
            *state = next;
        }
    }

    async fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), Error> {
        let mut state = self.state.write().await;
        state.expect(from)?;
        tracing::debug!(tag = %self.version.tag, from = %from, to = %to, "controller state change");
        *state = to;
        Ok(())
    }

    /// Fetch every manifest path and store the results as this version's
    /// generation.
    ///
    /// All seeds are fetched before anything is written, and the write is a
    /// single atomic batch, so a failed install leaves no partial generation.
    /// Shell aliases collapse onto the canonical shell key.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless freshly constructed; `InstallFailed` if any seed
    /// fails to fetch, answers with a non-2xx status, or cannot be stored. The
    /// controller is `Redundant` afterwards.
    pub async fn install(&self) -> Result<usize, Error> {
        self.transition(WorkerState::Parsed, WorkerState::Installing).await?;
        tracing::info!(tag = %self.version.tag, seeds = self.version.manifest.len(), "installing cache generation");

        match self.seed().await {
            Ok(count) => {
                self.set_state(WorkerState::Installed).await;
                tracing::info!(tag = %self.version.tag, entries = count, "cache generation installed");
                Ok(count)
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant).await;
                tracing::warn!(tag = %self.version.tag, error = %e, "install aborted");
                Err(e)
            }
        }
    }

    async fn seed(&self) -> Result<usize, Error> {
        let classifier = &self.settings.classifier;
        let mut entries = Vec::with_capacity(self.version.manifest.len());

        for path in &self.version.manifest {
            let failed = |reason: String| Error::InstallFailed { path: path.clone(), reason };

            let url = resolve(&self.settings.origin, path).map_err(|e| failed(e.to_string()))?;
            let response = self.fetcher.fetch(&url).await.map_err(|e| failed(e.to_string()))?;
            if !response.is_ok() {
                return Err(failed(format!("status {}", response.status)));
            }

            let class = classifier.classify(url.path());
            entries.push((CacheKey::for_request(&url, class, classifier), response));
        }

        let count = entries.len();
        let store_failed =
            |e: Error| Error::InstallFailed { path: format!("generation {}", self.version.tag), reason: e.to_string() };

        let existed = self.stored_generation().await.map_err(store_failed)?.is_some();
        let generation = self.store.open(&self.version.tag).await.map_err(store_failed)?;
        if let Err(e) = generation.put_all(entries).await {
            // A generation from an earlier run is left as it was.
            if !existed && let Err(cleanup) = self.store.delete(&self.version.tag).await {
                tracing::warn!(tag = %self.version.tag, error = %cleanup, "failed to discard partial generation");
            }
            return Err(store_failed(e));
        }

        self.attach(generation)?;
        Ok(count)
    }

    /// Adopt the generation already stored under this version's tag instead
    /// of seeding one. Used after a restart, when the network may be gone.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless freshly constructed; `GenerationMissing` if the
    /// store holds no entries under this tag. The controller is `Redundant`
    /// afterwards.
    pub async fn resume(&self) -> Result<usize, Error> {
        self.transition(WorkerState::Parsed, WorkerState::Installing).await?;

        match self.adopt().await {
            Ok(count) => {
                self.set_state(WorkerState::Installed).await;
                tracing::info!(tag = %self.version.tag, entries = count, "resumed stored cache generation");
                Ok(count)
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant).await;
                tracing::warn!(tag = %self.version.tag, error = %e, "resume aborted");
                Err(e)
            }
        }
    }

    async fn adopt(&self) -> Result<usize, Error> {
        let stored = self
            .stored_generation()
            .await?
            .filter(|info| info.entries > 0)
            .ok_or_else(|| Error::GenerationMissing(self.version.tag.clone()))?;
        let generation = self.store.open(&self.version.tag).await?;
        self.attach(generation)?;
        Ok(stored.entries as usize)
    }

    async fn stored_generation(&self) -> Result<Option<GenerationInfo>, Error> {
        Ok(self
            .store
            .generations()
            .await?
            .into_iter()
            .find(|info| info.tag == self.version.tag))
    }

    fn attach(&self, generation: S::Generation) -> Result<(), Error> {
        self.generation
            .set(generation)
            .map_err(|_| Error::InvalidState { expected: "empty generation slot".into(), actual: "already set".into() })
    }

    /// Delete every other generation, then claim all open sessions.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless installed. A store failure while deleting old
    /// generations returns the controller to `Installed` so activation can be
    /// retried.
    pub async fn activate(&self, clients: &ClientRegistry) -> Result<ActivationReport, Error> {
        self.transition(WorkerState::Installed, WorkerState::Activating).await?;

        let deleted = match self.delete_stale_generations().await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.set_state(WorkerState::Installed).await;
                return Err(e);
            }
        };

        let claimed = clients.claim(&self.version.tag).await;
        self.set_state(WorkerState::Activated).await;

        tracing::info!(tag = %self.version.tag, deleted = ?deleted, claimed, "cache generation activated");
        Ok(ActivationReport { deleted, claimed })
    }

    async fn delete_stale_generations(&self) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for info in self.store.generations().await? {
            if info.tag != self.version.tag && self.store.delete(&info.tag).await? {
                deleted.push(info.tag);
            }
        }
        Ok(deleted)
    }

    /// Retire this version after a newer one took over.
    pub async fn mark_redundant(&self) {
        self.set_state(WorkerState::Redundant).await;
    }

    /// Number of entries in this version's generation, if it was seeded.
    pub async fn entry_count(&self) -> Option<usize> {
        let generation = self.generation.get()?;
        match generation.keys().await {
            Ok(keys) => Some(keys.len()),
            Err(e) => {
                tracing::warn!(tag = %self.version.tag, error = %e, "failed to list cache keys");
                None
            }
        }
    }

    async fn cache_lookup(&self, key: &CacheKey) -> Option<offcache_core::StoredResponse> {
        let generation = self.generation.get()?;
        match generation.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(tag = %self.version.tag, key = %key, error = %e, "cache read failed; treating as miss");
                None
            }
        }
    }

    async fn cache_store(&self, key: CacheKey, response: offcache_core::StoredResponse) {
        let Some(generation) = self.generation.get() else {
            return;
        };
        let key_display = key.to_string();
        if let Err(e) = generation.put(key, response).await {
            tracing::warn!(tag = %self.version.tag, key = %key_display, error = %e, "cache write failed");
        }
    }

    fn resolve_target(&self, target: &str) -> String {
        resolve(&self.settings.origin, target)
            .map(String::from)
            .unwrap_or_else(|_| self.settings.scope_url())
    }
}
