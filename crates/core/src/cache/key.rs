//! Cache keys.
//!
//! The shell document is stored under its canonical path no matter which
//! alias was requested; every other resource is keyed by its full URL.

use sha2::{Digest, Sha256};
use url::Url;

use crate::classify::{Classifier, ResourceClass};

/// Key of a cache entry within one generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a request URL of a known class.
    pub fn for_request(url: &Url, class: ResourceClass, classifier: &Classifier) -> Self {
        if class == ResourceClass::ShellDocument {
            return Self(classifier.shell_path());
        }
        let mut url = url.clone();
        url.set_fragment(None);
        Self(url.into())
    }

    /// Key of the canonical shell document.
    pub fn shell(classifier: &Classifier) -> Self {
        Self(classifier.shell_path())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fixed-width SHA-256 digest used as the storage primary key.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
