//! Last-writer-wins decisions for both sync directions.
//!
//! Rows are compared by latest activity, `max(updated, deleted)`. A push
//! sends on a tie only when the local row is a tombstone. An apply writes on
//! a tie when either side is a tombstone.

use crate::models::{text_field, Row};

use super::timestamp::latest_of;

/// Latest activity of one side of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowActivity {
    /// Unix ms, `None` when neither timestamp parses
    pub latest: Option<i64>,
    pub tombstone: bool,
}

impl RowActivity {
    fn of(row: &Row, updated: &str, deleted: &str) -> Self {
        let deleted_at = text_field(row, deleted);
        Self {
            latest: latest_of([text_field(row, updated), deleted_at]),
            tombstone: deleted_at.is_some(),
        }
    }

    /// Activity of a camelCase local row.
    pub fn local(row: &Row) -> Self {
        Self::of(row, "updatedAt", "deletedAt")
    }

    /// Activity of a snake_case cloud row.
    pub fn cloud(row: &Row) -> Self {
        Self::of(row, "updated_at", "deleted_at")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    Send,
    /// Cloud is at least as new; nothing to log
    Skip,
    /// Cloud is strictly newer; the local version loses
    CloudNewer { local: i64, cloud: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyDecision {
    Apply,
    Skip,
    /// Local is strictly newer; the incoming version loses
    LocalNewer { local: i64, cloud: i64 },
}

/// Decide whether a local row should overwrite the cloud copy.
pub fn push_decision(local: RowActivity, cloud: Option<RowActivity>) -> PushDecision {
    let Some(cloud) = cloud else {
        return PushDecision::Send;
    };
    let Some(local_latest) = local.latest else {
        return PushDecision::Skip;
    };
    let Some(cloud_latest) = cloud.latest else {
        return PushDecision::Send;
    };

    if local_latest > cloud_latest || (local_latest == cloud_latest && local.tombstone) {
        PushDecision::Send
    } else if local_latest < cloud_latest {
        PushDecision::CloudNewer {
            local: local_latest,
            cloud: cloud_latest,
        }
    } else {
        PushDecision::Skip
    }
}

/// Decide whether a pulled row should overwrite the local copy.
pub fn apply_decision(local: Option<RowActivity>, cloud: RowActivity) -> ApplyDecision {
    let Some(local) = local else {
        return ApplyDecision::Apply;
    };
    let (Some(local_latest), Some(cloud_latest)) = (local.latest, cloud.latest) else {
        return ApplyDecision::Apply;
    };

    if cloud_latest > local_latest
        || (cloud_latest == local_latest && (cloud.tombstone || local.tombstone))
    {
        ApplyDecision::Apply
    } else if local_latest > cloud_latest {
        ApplyDecision::LocalNewer {
            local: local_latest,
            cloud: cloud_latest,
        }
    } else {
        ApplyDecision::Skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn local(updated: &str, deleted: Option<&str>) -> RowActivity {
        RowActivity::local(&row(json!({"updatedAt": updated, "deletedAt": deleted})))
    }

    fn cloud(updated: &str, deleted: Option<&str>) -> RowActivity {
        RowActivity::cloud(&row(json!({"updated_at": updated, "deleted_at": deleted})))
    }

    #[test]
    fn activity_takes_max_of_updated_and_deleted() {
        let activity = local("2024-01-01 10:00:00", Some("2024-01-02 10:00:00"));
        assert!(activity.tombstone);
        assert_eq!(
            activity.latest,
            crate::sync::timestamp::to_epoch_millis("2024-01-02T10:00:00Z")
        );
    }

    #[test]
    fn push_sends_when_cloud_missing_or_older() {
        let l = local("2024-01-02 00:00:00", None);
        assert_eq!(push_decision(l, None), PushDecision::Send);
        assert_eq!(
            push_decision(l, Some(cloud("2024-01-01T00:00:00Z", None))),
            PushDecision::Send
        );
    }

    #[test]
    fn push_tie_sends_tombstone_but_not_live_row() {
        let c = cloud("2024-01-02T00:00:00Z", None);
        assert_eq!(
            push_decision(local("2024-01-02 00:00:00", None), Some(c)),
            PushDecision::Skip
        );
        assert_eq!(
            push_decision(
                local("2024-01-01 00:00:00", Some("2024-01-02 00:00:00")),
                Some(c)
            ),
            PushDecision::Send
        );
    }

    #[test]
    fn push_reports_cloud_newer() {
        let decision = push_decision(
            local("2024-01-01 00:00:00", None),
            Some(cloud("2024-01-03T00:00:00Z", None)),
        );
        assert!(matches!(decision, PushDecision::CloudNewer { local, cloud } if cloud > local));
    }

    #[test]
    fn push_with_unparseable_timestamps() {
        let broken = local("garbage", None);
        assert_eq!(push_decision(broken, None), PushDecision::Send);
        assert_eq!(
            push_decision(broken, Some(cloud("2024-01-01T00:00:00Z", None))),
            PushDecision::Skip
        );
        assert_eq!(
            push_decision(local("2024-01-01 00:00:00", None), Some(cloud("", None))),
            PushDecision::Send
        );
    }

    #[test]
    fn apply_when_local_missing_or_undefined() {
        let c = cloud("2024-01-01T00:00:00Z", None);
        assert_eq!(apply_decision(None, c), ApplyDecision::Apply);
        assert_eq!(apply_decision(Some(local("???", None)), c), ApplyDecision::Apply);
    }

    #[test]
    fn apply_tie_keeps_live_local_against_live_cloud() {
        let l = local("2024-01-02 00:00:00", None);
        assert_eq!(
            apply_decision(Some(l), cloud("2024-01-02T00:00:00Z", None)),
            ApplyDecision::Skip
        );
    }

    #[test]
    fn apply_tie_writes_when_either_side_is_tombstone() {
        let live_local = local("2024-01-02 00:00:00", None);
        let tombstoned_local = local("2024-01-01 00:00:00", Some("2024-01-02 00:00:00"));
        let live_cloud = cloud("2024-01-02T00:00:00Z", None);
        let tombstoned_cloud = cloud("2024-01-01T00:00:00Z", Some("2024-01-02T00:00:00Z"));

        for (l, c) in [
            (live_local, tombstoned_cloud),
            (tombstoned_local, live_cloud),
            (tombstoned_local, tombstoned_cloud),
        ] {
            assert_eq!(apply_decision(Some(l), c), ApplyDecision::Apply);
        }
    }

    #[test]
    fn apply_tombstone_still_loses_to_strictly_newer_local() {
        let decision = apply_decision(
            Some(local("2024-01-03 00:00:00", None)),
            cloud("2024-01-01T00:00:00Z", Some("2024-01-02T00:00:00Z")),
        );
        assert!(matches!(decision, ApplyDecision::LocalNewer { .. }));
    }

    #[test]
    fn apply_reports_local_newer() {
        assert_eq!(
            apply_decision(
                Some(local("2024-01-05 00:00:00", None)),
                cloud("2024-01-06T00:00:00Z", None)
            ),
            ApplyDecision::Apply
        );
        assert!(matches!(
            apply_decision(
                Some(local("2024-01-07 00:00:00", None)),
                cloud("2024-01-06T00:00:00Z", None)
            ),
            ApplyDecision::LocalNewer { .. }
        ));
    }
}
