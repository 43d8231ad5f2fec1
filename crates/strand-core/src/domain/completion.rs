//! Completion metadata stored per finished identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::RunId;

/// What the completion store keeps for one identity.
///
/// `version` is the task kind's version marker at the time it finished. A
/// record whose version no longer matches the registered kind is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMeta {
    pub version: String,
    pub run_id: RunId,
    pub completed_at: DateTime<Utc>,
}

impl CompletionMeta {
    pub fn new(version: impl Into<String>, run_id: RunId, completed_at: DateTime<Utc>) -> Self {
        Self {
            version: version.into(),
            run_id,
            completed_at,
        }
    }

    /// Is this record still valid for a kind currently at `version`?
    pub fn is_current(&self, version: &str) -> bool {
        self.version == version
    }
}
