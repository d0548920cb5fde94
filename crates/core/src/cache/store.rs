//! Storage abstraction for cache generations.
//!
//! A [`CacheStore`] holds any number of named generations; a
//! [`GenerationStore`] is a handle onto one of them. Backends: SQLite
//! ([`CacheDb`](super::CacheDb)) and in-memory ([`MemoryStore`](super::MemoryStore)).

use async_trait::async_trait;

use super::key::CacheKey;
use super::response::StoredResponse;
use crate::Error;

/// Summary of one stored generation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
pub struct GenerationInfo {
    pub tag: String,
    pub entries: u64,
}

/// Collection of versioned cache generations.
#[async_trait]
pub trait CacheStore: Send + Sync {
    type Generation: GenerationStore + 'static;

    /// Open a generation by tag, creating it if absent.
    async fn open(&self, tag: &str) -> Result<Self::Generation, Error>;

    /// Tags of every stored generation.
    async fn generations(&self) -> Result<Vec<GenerationInfo>, Error>;

    /// Delete a generation and all its entries. Returns whether it existed.
    async fn delete(&self, tag: &str) -> Result<bool, Error>;
}

/// Key-value view of a single generation.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    fn tag(&self) -> &str;

    async fn get(&self, key: &CacheKey) -> Result<Option<StoredResponse>, Error>;

    /// Insert or overwrite one entry.
    async fn put(&self, key: CacheKey, response: StoredResponse) -> Result<(), Error> {
        self.put_all(vec![(key, response)]).await
    }

    /// Write a batch of entries atomically: either all land or none do.
    async fn put_all(&self, entries: Vec<(CacheKey, StoredResponse)>) -> Result<(), Error>;

    async fn keys(&self) -> Result<Vec<CacheKey>, Error>;

    /// Remove every entry but keep the generation. Returns the number removed.
    async fn delete_all(&self) -> Result<u64, Error>;
}
