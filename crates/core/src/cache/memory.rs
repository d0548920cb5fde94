//! In-memory generation storage.
//!
//! Same semantics as the SQLite backend, minus persistence. Backs the
//! controller and tool tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::key::CacheKey;
use super::response::StoredResponse;
use super::store::{CacheStore, GenerationInfo, GenerationStore};
use crate::Error;

type Generations = HashMap<String, (u64, BTreeMap<CacheKey, StoredResponse>)>;

/// Process-local cache store.
#[derive(Clone, Default, Debug)]
pub struct MemoryStore {
    inner: Arc<RwLock<Generations>>,
    next_seq: Arc<std::sync::atomic::AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Handle onto one generation of a [`MemoryStore`].
#[derive(Clone, Debug)]
pub struct MemoryGeneration {
    inner: Arc<RwLock<Generations>>,
    tag: String,
}

#[async_trait]
impl CacheStore for MemoryStore {
    type Generation = MemoryGeneration;

    async fn open(&self, tag: &str) -> Result<MemoryGeneration, Error> {
        let mut generations = self.inner.write().await;
        if !generations.contains_key(tag) {
            let seq = self.next_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            generations.insert(tag.to_string(), (seq, BTreeMap::new()));
        }
        Ok(MemoryGeneration { inner: Arc::clone(&self.inner), tag: tag.to_string() })
    }

    async fn generations(&self) -> Result<Vec<GenerationInfo>, Error> {
        let generations = self.inner.read().await;
        let mut ordered: Vec<_> = generations.iter().collect();
        ordered.sort_by_key(|(_, (seq, _))| *seq);
        Ok(ordered
            .into_iter()
            .map(|(tag, (_, entries))| GenerationInfo { tag: tag.clone(), entries: entries.len() as u64 })
            .collect())
    }

    async fn delete(&self, tag: &str) -> Result<bool, Error> {
        Ok(self.inner.write().await.remove(tag).is_some())
    }
}

#[async_trait]
impl GenerationStore for MemoryGeneration {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<StoredResponse>, Error> {
        let generations = self.inner.read().await;
        Ok(generations.get(&self.tag).and_then(|(_, entries)| entries.get(key).cloned()))
    }

    async fn put_all(&self, entries: Vec<(CacheKey, StoredResponse)>) -> Result<(), Error> {
        let mut generations = self.inner.write().await;
        let (_, stored) = generations
            .get_mut(&self.tag)
            .ok_or_else(|| Error::GenerationMissing(self.tag.clone()))?;
        stored.extend(entries);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<CacheKey>, Error> {
        let generations = self.inner.read().await;
        Ok(generations
            .get(&self.tag)
            .map(|(_, entries)| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_all(&self) -> Result<u64, Error> {
        let mut generations = self.inner.write().await;
        Ok(generations
            .get_mut(&self.tag)
            .map(|(_, entries)| std::mem::take(entries).len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseType;
    use bytes::Bytes;

    fn response(body: &'static str) -> StoredResponse {
        StoredResponse {
            url: "https://example.com/app/styles.css".into(),
            status: 200,
            response_type: ResponseType::Basic,
            headers: Vec::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_within_generation() {
        let store = MemoryStore::new();
        let generation = store.open("v1").await.unwrap();
        generation.put(CacheKey::new("k"), response("body")).await.unwrap();

        let stored = generation.get(&CacheKey::new("k")).await.unwrap().unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"body"));
    }

    #[tokio::test]
    async fn test_generations_listed_in_creation_order() {
        let store = MemoryStore::new();
        store.open("v2").await.unwrap();
        store.open("v10").await.unwrap();
        store.open("v2").await.unwrap();

        let tags: Vec<String> = store.generations().await.unwrap().into_iter().map(|g| g.tag).collect();
        assert_eq!(tags, vec!["v2", "v10"]);
    }

    #[tokio::test]
    async fn test_deleted_generation_rejects_writes() {
        let store = MemoryStore::new();
        let generation = store.open("v1").await.unwrap();
        assert!(store.delete("v1").await.unwrap());

        let result = generation.put(CacheKey::new("k"), response("x")).await;
        assert!(matches!(result, Err(Error::GenerationMissing(_))));
        assert!(generation.get(&CacheKey::new("k")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_all() {
        let store = MemoryStore::new();
        let generation = store.open("v1").await.unwrap();
        generation
            .put_all(vec![(CacheKey::new("a"), response("a")), (CacheKey::new("b"), response("b"))])
            .await
            .unwrap();

        assert_eq!(generation.delete_all().await.unwrap(), 2);
        assert!(generation.keys().await.unwrap().is_empty());
    }
}
