//! Shared sync state types.

use std::fmt;

/// Sync state published by the engine to interested clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No cloud store configured; sync calls are no-ops.
    Offline,
    /// Configured, no cycle has run yet.
    Idle,
    Syncing,
    Synced,
    Error,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Offline => "offline",
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Which directions a cycle covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// Pull then push, per table
    Full,
    PullOnly,
    PushOnly,
}

impl SyncMode {
    pub const fn pulls(self) -> bool {
        matches!(self, Self::Full | Self::PullOnly)
    }

    pub const fn pushes(self) -> bool {
        matches!(self, Self::Full | Self::PushOnly)
    }
}

/// Step of a table pass, reported when the pass fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Pulling,
    Applying,
    CheckpointingPull,
    ReadingLocal,
    Pushing,
    CheckpointingPush,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pulling => "pulling",
            Self::Applying => "applying",
            Self::CheckpointingPull => "checkpointing pull",
            Self::ReadingLocal => "reading local changes",
            Self::Pushing => "pushing",
            Self::CheckpointingPush => "checkpointing push",
        };
        f.write_str(label)
    }
}
