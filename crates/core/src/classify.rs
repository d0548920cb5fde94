//! Resource classification.
//!
//! Every intercepted request is sorted into a [`ResourceClass`] from its path
//! alone, and the class decides the caching policy. Nothing here does I/O.

use serde::{Deserialize, Serialize};

/// Cache-policy category of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    /// The single HTML entry point, under either of its aliases.
    ShellDocument,
    Script,
    /// Structured data (JSON).
    Data,
    /// Stylesheets, images, fonts and anything else.
    Static,
    WorkerScript,
    Manifest,
}

/// How the controller treats a class of resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Not intercepted; the caller goes to the network itself.
    Passthrough,
    NetworkFirst,
    CacheFirst,
}

impl ResourceClass {
    pub fn policy(self) -> Policy {
        match self {
            ResourceClass::WorkerScript | ResourceClass::Manifest => Policy::Passthrough,
            ResourceClass::Script | ResourceClass::Data => Policy::NetworkFirst,
            ResourceClass::ShellDocument | ResourceClass::Static => Policy::CacheFirst,
        }
    }
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceClass::ShellDocument => "shell_document",
            ResourceClass::Script => "script",
            ResourceClass::Data => "data",
            ResourceClass::Static => "static",
            ResourceClass::WorkerScript => "worker_script",
            ResourceClass::Manifest => "manifest",
        };
        f.write_str(name)
    }
}

/// Path classifier bound to one application scope.
#[derive(Debug, Clone)]
pub struct Classifier {
    scope: String,
    worker_script: String,
}

impl Classifier {
    /// `scope` must start and end with `/` (checked by config validation).
    pub fn new(scope: impl Into<String>, worker_script: impl Into<String>) -> Self {
        Self { scope: scope.into(), worker_script: worker_script.into() }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Canonical path of the shell document.
    pub fn shell_path(&self) -> String {
        format!("{}index.html", self.scope)
    }

    /// Whether `path` falls under the controlled scope.
    pub fn in_scope(&self, path: &str) -> bool {
        path.starts_with(&self.scope)
    }

    /// Classify a request path.
    ///
    /// Precedence: shell aliases, then worker script and manifest, then
    /// script and data suffixes. Anything left is static.
    pub fn classify(&self, path: &str) -> ResourceClass {
        if path == self.scope || path == self.shell_path() {
            return ResourceClass::ShellDocument;
        }

        let file_name = path.rsplit('/').next().unwrap_or(path);

        if file_name == self.worker_script {
            return ResourceClass::WorkerScript;
        }
        if file_name == "manifest.json" || file_name.ends_with(".webmanifest") {
            return ResourceClass::Manifest;
        }
        if file_name.ends_with(".js") || file_name.ends_with(".mjs") {
            return ResourceClass::Script;
        }
        if file_name.ends_with(".json") {
            return ResourceClass::Data;
        }

        ResourceClass::Static
    }
}
