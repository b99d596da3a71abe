//! Sync checkpoint model

use serde::{Deserialize, Serialize};

/// Per-table watermarks of the last successful push and pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub table_name: String,
    /// Latest activity instant already reconciled towards the cloud
    pub last_push_at: Option<String>,
    /// Latest activity instant already fetched from the cloud
    pub last_pull_at: Option<String>,
}

impl SyncCheckpoint {
    /// Checkpoint for a table that has never been synced.
    pub fn empty(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            last_push_at: None,
            last_pull_at: None,
        }
    }
}

/// Partial checkpoint update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointUpdate {
    pub last_push_at: Option<String>,
    pub last_pull_at: Option<String>,
}

impl CheckpointUpdate {
    #[must_use]
    pub fn push(at: impl Into<String>) -> Self {
        Self {
            last_push_at: Some(at.into()),
            last_pull_at: None,
        }
    }

    #[must_use]
    pub fn pull(at: impl Into<String>) -> Self {
        Self {
            last_push_at: None,
            last_pull_at: Some(at.into()),
        }
    }
}
