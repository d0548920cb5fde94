//! Core types and shared functionality for offcache.
//!
//! This crate provides:
//! - Versioned cache generations with SQLite and in-memory backends
//! - Resource classification that drives the caching policy
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;

pub use cache::{
    CacheDb, CacheKey, CacheStore, GenerationInfo, GenerationStore, MemoryGeneration, MemoryStore, ResponseType,
    SqliteGeneration, StoredResponse,
};
pub use classify::{Classifier, Policy, ResourceClass};
pub use config::AppConfig;
pub use error::Error;
