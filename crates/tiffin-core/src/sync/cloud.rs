//! Cloud side of the sync: conflict-checked upload and paginated download.

use std::collections::{HashMap, HashSet};

use super::mapper::SchemaMapper;
use super::resolve::{push_decision, PushDecision, RowActivity};
use super::timestamp::{keep_latest, latest_stamp, normalize, Stamp};
use crate::cloud::{CloudQuery, CloudStore, Filter};
use crate::config::SyncSettings;
use crate::error::Result;
use crate::models::{row_id, text_field, ConflictDirection, NewSyncConflict, Row, Table};

const STATE_COLUMNS: [&str; 3] = ["id", "updated_at", "deleted_at"];

/// Result of pushing one table's local changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    pub candidates: usize,
    pub sent: usize,
    /// Latest activity among rows actually sent
    pub max_sent: Option<Stamp>,
    /// Latest activity among every candidate
    pub max_candidate: Option<Stamp>,
    /// Candidates that lost to a strictly newer cloud copy
    pub conflicts: Vec<NewSyncConflict>,
}

/// Uploads local rows that are newer than their cloud copies.
pub struct CloudUpsertWriter<'a, C> {
    cloud: &'a C,
    mapper: &'a SchemaMapper,
    settings: SyncSettings,
}

impl<'a, C: CloudStore> CloudUpsertWriter<'a, C> {
    pub fn new(cloud: &'a C, mapper: &'a SchemaMapper, settings: SyncSettings) -> Self {
        Self {
            cloud,
            mapper,
            settings: settings.sanitized(),
        }
    }

    pub async fn push(&self, table: Table, rows: &[Row]) -> Result<PushOutcome> {
        let mut outcome = PushOutcome {
            candidates: rows.len(),
            ..PushOutcome::default()
        };
        if rows.is_empty() {
            return Ok(outcome);
        }

        let remote = self.fetch_remote_state(table, rows).await?;

        let mut survivors = Vec::new();
        for row in rows {
            let stamp = latest_stamp([text_field(row, "updatedAt"), text_field(row, "deletedAt")]);
            keep_latest(&mut outcome.max_candidate, stamp.clone());

            let Some(id) = row_id(row) else {
                tracing::warn!(target: "sync::cloud", table = %table, "Skipping local row without id");
                continue;
            };

            match push_decision(RowActivity::local(row), remote.get(&id).copied()) {
                PushDecision::Send => {
                    survivors.push(self.mapper.to_cloud_shape(table, row));
                    keep_latest(&mut outcome.max_sent, stamp);
                }
                PushDecision::Skip => {}
                PushDecision::CloudNewer { local, cloud } => {
                    outcome.conflicts.push(NewSyncConflict {
                        table_name: table.name().to_string(),
                        row_id: id,
                        direction: ConflictDirection::Push,
                        local_latest_at: local,
                        incoming_latest_at: cloud,
                    });
                }
            }
        }

        for batch in survivors.chunks(self.settings.upsert_batch_size) {
            self.cloud.upsert(table, batch).await?;
            outcome.sent += batch.len();
        }

        tracing::debug!(
            target: "sync::cloud",
            table = %table,
            candidates = outcome.candidates,
            sent = outcome.sent,
            conflicts = outcome.conflicts.len(),
            "Pushed local changes"
        );
        Ok(outcome)
    }

    async fn fetch_remote_state(&self, table: Table, rows: &[Row]) -> Result<HashMap<String, RowActivity>> {
        let ids: Vec<String> = rows.iter().filter_map(row_id).collect();
        let mut remote = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(self.settings.id_chunk_size) {
            let query = CloudQuery::new()
                .columns(&STATE_COLUMNS)
                .is_in("id", chunk.to_vec());
            for cloud_row in self.cloud.select(table, &query).await? {
                if let Some(id) = row_id(&cloud_row) {
                    remote.insert(id, RowActivity::cloud(&cloud_row));
                }
            }
        }
        Ok(remote)
    }
}

/// Rows fetched from the cloud for one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullBatch {
    pub rows: Vec<Row>,
    /// Latest activity among the fetched rows
    pub max_fetched: Option<Stamp>,
}

/// Downloads shop-scoped rows changed at or after a watermark.
pub struct CloudChangeReader<'a, C> {
    cloud: &'a C,
    shop_id: &'a str,
    settings: SyncSettings,
}

impl<'a, C: CloudStore> CloudChangeReader<'a, C> {
    pub fn new(cloud: &'a C, shop_id: &'a str, settings: SyncSettings) -> Self {
        Self {
            cloud,
            shop_id,
            settings: settings.sanitized(),
        }
    }

    /// Fetch every page of changes, ordered by `updated_at` then `id`.
    ///
    /// Pages continue from the last row seen rather than an offset, so rows
    /// re-stamped by another device mid-pull cannot shift a page boundary
    /// past an unread row.
    pub async fn pull(&self, table: Table, since: Option<&str>) -> Result<PullBatch> {
        let mut base = CloudQuery::new().filter(Filter::ShopScope {
            shop_id: self.shop_id.to_string(),
        });
        if let Some(instant) = since.and_then(normalize) {
            base = base.filter(Filter::AtOrAfter {
                columns: vec!["updated_at".to_string(), "deleted_at".to_string()],
                instant,
            });
        }
        let base = base.order_by("updated_at").order_by("id");

        let page_size = self.settings.pull_page_size;
        let mut rows = Vec::new();
        let mut cursor: Option<(Option<String>, String)> = None;
        loop {
            let mut query = base.clone();
            if let Some((updated_at, id)) = &cursor {
                query = query.after("updated_at", updated_at.as_deref(), id);
            }
            let page = self
                .cloud
                .select(table, &query.page(0, page_size))
                .await?;
            let fetched = page.len();

            let next = page
                .last()
                .map(|last| (text_field(last, "updated_at").map(str::to_string), row_id(last)));
            rows.extend(page);

            if fetched < page_size {
                break;
            }
            match next {
                Some((updated_at, Some(id))) => cursor = Some((updated_at, id)),
                _ => {
                    tracing::warn!(
                        target: "sync::cloud",
                        table = %table,
                        "Cloud row without id ends the pull"
                    );
                    break;
                }
            }
        }

        let mut batch = PullBatch {
            rows: latest_copies(rows),
            max_fetched: None,
        };
        for row in &batch.rows {
            let stamp = latest_stamp([text_field(row, "updated_at"), text_field(row, "deleted_at")]);
            keep_latest(&mut batch.max_fetched, stamp);
        }

        tracing::debug!(
            target: "sync::cloud",
            table = %table,
            fetched = batch.rows.len(),
            "Pulled cloud changes"
        );
        Ok(batch)
    }
}

/// Keep only the last copy of each id, preserving fetch order.
fn latest_copies(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    let mut kept: Vec<Row> = rows
        .into_iter()
        .rev()
        .filter(|row| row_id(row).is_none_or(|id| seen.insert(id)))
        .collect();
    kept.reverse();
    kept
}
