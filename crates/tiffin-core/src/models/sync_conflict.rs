//! Sync conflict model

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of the sync discarded a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictDirection {
    /// Local row not sent because the cloud copy was newer
    Push,
    /// Cloud row not applied because the local copy was newer
    Pull,
}

impl ConflictDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "push" => Some(Self::Push),
            "pull" => Some(Self::Pull),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Recorded sync conflict resolved by strategy (e.g., LWW)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Table the row belongs to
    pub table_name: String,
    /// Row involved in the conflict
    pub row_id: String,
    pub direction: ConflictDirection,
    /// Local latest activity when the conflict occurred (unix ms)
    pub local_latest_at: i64,
    /// Incoming latest activity that was compared against (unix ms)
    pub incoming_latest_at: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}

/// Conflict about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncConflict {
    pub table_name: String,
    pub row_id: String,
    pub direction: ConflictDirection,
    pub local_latest_at: i64,
    pub incoming_latest_at: i64,
}
