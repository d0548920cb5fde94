//! Network client for offcache.
//!
//! This crate provides the HTTP fetch layer the controller falls back to
//! (or prefers, for code and data) and URL resolution against the app origin.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, Fetcher, UrlError, canonicalize, resolve, same_origin};
