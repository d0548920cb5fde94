//! Controller lifecycle states.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offcache_core::Error;

/// Lifecycle of one controller version.
///
/// `Parsed -> Installing -> Installed -> Activating -> Activated -> Redundant`.
/// A failed install goes straight to `Redundant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Constructed, nothing cached yet.
    Parsed,
    Installing,
    /// Seeded and waiting to be promoted.
    Installed,
    Activating,
    /// Serving fetches.
    Activated,
    /// Superseded or failed to install.
    Redundant,
}

impl WorkerState {
    /// Only an activated controller intercepts fetches.
    pub fn can_intercept_fetch(self) -> bool {
        self == WorkerState::Activated
    }

    pub(crate) fn expect(self, expected: WorkerState) -> Result<(), Error> {
        if self == expected {
            Ok(())
        } else {
            Err(Error::InvalidState { expected: expected.to_string(), actual: self.to_string() })
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}
