//! Versioned cache generations.
//!
//! This module provides the generation store behind the offline cache
//! controller. It supports:
//!
//! - A backend-neutral [`CacheStore`] / [`GenerationStore`] interface
//! - A persistent SQLite backend with async access via tokio-rusqlite
//! - An in-memory backend with identical semantics
//! - Canonical cache keys with SHA-256 storage digests

pub mod connection;
pub mod generations;
pub mod key;
pub mod memory;
pub mod migrations;
pub mod response;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use generations::SqliteGeneration;
pub use key::CacheKey;
pub use memory::{MemoryGeneration, MemoryStore};
pub use response::{ResponseType, StoredResponse};
pub use store::{CacheStore, GenerationInfo, GenerationStore};
