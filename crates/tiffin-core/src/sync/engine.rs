//! Sync orchestrator.
//!
//! One cycle walks [`Table::SYNC_ORDER`]; for each table it pulls cloud
//! changes into the local store, advances the pull watermark, then pushes
//! local changes and advances the push watermark. The first failing table
//! stops the cycle. Tables already processed stay committed and the next
//! cycle resumes from the stored watermarks.

use std::collections::BTreeSet;

use libsql::Connection;
use tokio::sync::{broadcast, watch, Mutex};

use super::cloud::{CloudChangeReader, CloudUpsertWriter};
use super::local::{LocalApplyWriter, LocalChangeReader};
use super::mapper::SchemaMapper;
use super::timestamp::{keep_latest, to_epoch_millis, Stamp};
use crate::cloud::{CloudStore, PostgrestCloudStore};
use crate::config::{CloudConfig, SyncSettings};
use crate::db::{CheckpointRepository, LibSqlCheckpointRepository, LibSqlConflictRepository};
use crate::error::{Error, Result};
use crate::models::{CheckpointUpdate, SyncCheckpoint, SyncConflict, SyncDomain, Table};
use crate::state::{SyncMode, SyncPhase, SyncState};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Per-table counts from one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableReport {
    pub table: Table,
    pub fetched: usize,
    pub applied: usize,
    pub skipped: usize,
    pub backfilled: usize,
    pub candidates: usize,
    pub sent: usize,
    /// Pull and push conflicts combined
    pub conflicts: usize,
}

impl TableReport {
    const fn new(table: Table) -> Self {
        Self {
            table,
            fetched: 0,
            applied: 0,
            skipped: 0,
            backfilled: 0,
            candidates: 0,
            sent: 0,
            conflicts: 0,
        }
    }
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub tables: Vec<TableReport>,
    /// Domains notified because rows were applied locally
    pub notified: Vec<SyncDomain>,
}

impl SyncReport {
    pub fn table(&self, table: Table) -> Option<&TableReport> {
        self.tables.iter().find(|report| report.table == table)
    }

    pub fn applied(&self) -> usize {
        self.tables.iter().map(|report| report.applied).sum()
    }

    pub fn sent(&self) -> usize {
        self.tables.iter().map(|report| report.sent).sum()
    }

    pub fn conflicts(&self) -> usize {
        self.tables.iter().map(|report| report.conflicts).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// No cloud store configured; nothing was done
    NotConfigured,
    /// Another cycle holds the engine
    AlreadyRunning,
}

/// Bidirectional sync between the local store and a cloud store.
pub struct SyncEngine<C> {
    conn: Connection,
    cloud: Option<C>,
    mapper: SchemaMapper,
    settings: SyncSettings,
    running: Mutex<()>,
    state: watch::Sender<SyncState>,
    changes: broadcast::Sender<SyncDomain>,
}

impl SyncEngine<PostgrestCloudStore> {
    /// Engine for the configured cloud, or an offline engine when unconfigured.
    pub fn from_config(conn: Connection, config: &CloudConfig, settings: SyncSettings) -> Result<Self> {
        let cloud = if config.is_configured() {
            Some(PostgrestCloudStore::new(config)?)
        } else {
            None
        };
        Ok(Self::new(conn, cloud, SchemaMapper::new(config.shop_id.clone()), settings))
    }
}

impl<C: CloudStore> SyncEngine<C> {
    pub fn new(conn: Connection, cloud: Option<C>, mapper: SchemaMapper, settings: SyncSettings) -> Self {
        let initial = if cloud.is_some() {
            SyncState::Idle
        } else {
            SyncState::Offline
        };
        let (state, _) = watch::channel(initial);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            conn,
            cloud,
            mapper,
            settings: settings.sanitized(),
            running: Mutex::new(()),
            state,
            changes,
        }
    }

    pub const fn is_configured(&self) -> bool {
        self.cloud.is_some()
    }

    pub fn shop_id(&self) -> &str {
        self.mapper.shop_id()
    }

    /// Subscribe to per-domain change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncDomain> {
        self.changes.subscribe()
    }

    /// Watch the engine state.
    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Pull then push every table.
    pub async fn sync_all(&self) -> Result<SyncOutcome> {
        self.run(SyncMode::Full).await
    }

    pub async fn pull_only(&self) -> Result<SyncOutcome> {
        self.run(SyncMode::PullOnly).await
    }

    pub async fn push_only(&self) -> Result<SyncOutcome> {
        self.run(SyncMode::PushOnly).await
    }

    pub async fn run(&self, mode: SyncMode) -> Result<SyncOutcome> {
        let Some(cloud) = self.cloud.as_ref() else {
            tracing::warn!(target: "sync", "Cloud store not configured; skipping sync");
            return Ok(SyncOutcome::NotConfigured);
        };
        let Ok(_guard) = self.running.try_lock() else {
            tracing::info!(target: "sync", "Sync already in progress");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        self.state.send_replace(SyncState::Syncing);
        tracing::info!(target: "sync", mode = ?mode, shop_id = self.mapper.shop_id(), "Sync started");

        match self.run_tables(cloud, mode).await {
            Ok(report) => {
                self.state.send_replace(SyncState::Synced);
                tracing::info!(
                    target: "sync",
                    applied = report.applied(),
                    sent = report.sent(),
                    conflicts = report.conflicts(),
                    "Sync completed"
                );
                Ok(SyncOutcome::Completed(report))
            }
            Err(error) => {
                self.state.send_replace(SyncState::Error);
                tracing::error!(target: "sync", error = %error, "Sync failed");
                Err(error)
            }
        }
    }

    async fn run_tables(&self, cloud: &C, mode: SyncMode) -> Result<SyncReport> {
        let mut tables = Vec::with_capacity(Table::SYNC_ORDER.len());
        for table in Table::SYNC_ORDER {
            tables.push(self.sync_table(cloud, table, mode).await?);
        }

        let domains: BTreeSet<SyncDomain> = tables
            .iter()
            .filter(|report| report.applied > 0 || report.backfilled > 0)
            .map(|report| report.table.domain())
            .collect();
        for domain in &domains {
            // No receivers is fine.
            let _ = self.changes.send(*domain);
        }

        Ok(SyncReport {
            mode,
            tables,
            notified: domains.into_iter().collect(),
        })
    }

    async fn sync_table(&self, cloud: &C, table: Table, mode: SyncMode) -> Result<TableReport> {
        let checkpoints = LibSqlCheckpointRepository::new(&self.conn);
        let checkpoint = checkpoints
            .get(table)
            .await
            .map_err(failed(table, SyncPhase::Pulling))?;
        let mut report = TableReport::new(table);

        if mode.pulls() {
            let batch = CloudChangeReader::new(cloud, self.mapper.shop_id(), self.settings)
                .pull(table, checkpoint.last_pull_at.as_deref())
                .await
                .map_err(failed(table, SyncPhase::Pulling))?;
            report.fetched = batch.rows.len();

            let applied = LocalApplyWriter::new(&self.conn, cloud, &self.mapper)
                .apply(table, &batch.rows)
                .await
                .map_err(failed(table, SyncPhase::Applying))?;
            report.applied = applied.applied;
            report.skipped = applied.skipped;
            report.backfilled = applied.backfilled;
            report.conflicts += applied.conflicts;

            if let Some(max_fetched) = batch.max_fetched {
                if advances(checkpoint.last_pull_at.as_deref(), &max_fetched) {
                    checkpoints
                        .set(table, CheckpointUpdate::pull(max_fetched.text))
                        .await
                        .map_err(failed(table, SyncPhase::CheckpointingPull))?;
                }
            }
        }

        if mode.pushes() {
            let rows = LocalChangeReader::new(&self.conn)
                .read(table, checkpoint.last_push_at.as_deref())
                .await
                .map_err(failed(table, SyncPhase::ReadingLocal))?;

            let pushed = CloudUpsertWriter::new(cloud, &self.mapper, self.settings)
                .push(table, &rows)
                .await
                .map_err(failed(table, SyncPhase::Pushing))?;
            report.candidates = pushed.candidates;
            report.sent = pushed.sent;
            report.conflicts += pushed.conflicts.len();

            let conflicts = LibSqlConflictRepository::new(&self.conn);
            for conflict in &pushed.conflicts {
                conflicts
                    .record(conflict)
                    .await
                    .map_err(failed(table, SyncPhase::Pushing))?;
            }

            // Every candidate was either sent or is no newer than the cloud copy.
            let mut watermark = pushed.max_candidate;
            keep_latest(&mut watermark, pushed.max_sent);
            if let Some(watermark) = watermark {
                if advances(checkpoint.last_push_at.as_deref(), &watermark) {
                    checkpoints
                        .set(table, CheckpointUpdate::push(watermark.text))
                        .await
                        .map_err(failed(table, SyncPhase::CheckpointingPush))?;
                }
            }
        }

        tracing::info!(
            target: "sync",
            table = %table,
            fetched = report.fetched,
            applied = report.applied,
            candidates = report.candidates,
            sent = report.sent,
            conflicts = report.conflicts,
            "Table synced"
        );
        Ok(report)
    }

    /// Clear the push watermark so the next cycle re-reads local rows.
    pub async fn reset_push(&self, table: Option<Table>) -> Result<()> {
        LibSqlCheckpointRepository::new(&self.conn).reset_push(table).await?;
        tracing::info!(target: "sync", table = ?table, "Push watermark reset");
        Ok(())
    }

    /// Clear the pull watermark so the next cycle re-fetches cloud rows.
    pub async fn reset_pull(&self, table: Option<Table>) -> Result<()> {
        LibSqlCheckpointRepository::new(&self.conn).reset_pull(table).await?;
        tracing::info!(target: "sync", table = ?table, "Pull watermark reset");
        Ok(())
    }

    /// Checkpoint of every synchronized table, in sync order.
    pub async fn checkpoints(&self) -> Result<Vec<SyncCheckpoint>> {
        let repository = LibSqlCheckpointRepository::new(&self.conn);
        let mut checkpoints = Vec::with_capacity(Table::SYNC_ORDER.len());
        for table in Table::SYNC_ORDER {
            checkpoints.push(repository.get(table).await?);
        }
        Ok(checkpoints)
    }

    /// Most recent conflicts first.
    pub async fn conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        LibSqlConflictRepository::new(&self.conn).list(limit).await
    }
}

fn failed(table: Table, phase: SyncPhase) -> impl FnOnce(Error) -> Error {
    move |source| {
        tracing::error!(target: "sync", table = %table, phase = %phase, error = %source, "Table sync failed");
        Error::SyncFailed {
            table,
            phase,
            source: Box::new(source),
        }
    }
}

/// A stored watermark only ever moves forward.
fn advances(current: Option<&str>, next: &Stamp) -> bool {
    current
        .and_then(to_epoch_millis)
        .is_none_or(|current| next.millis > current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::InMemoryCloudStore;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    fn engine(db: &Database, cloud: Option<InMemoryCloudStore>) -> SyncEngine<InMemoryCloudStore> {
        SyncEngine::new(
            db.connection().clone(),
            cloud,
            SchemaMapper::default(),
            SyncSettings::default(),
        )
    }

    #[test]
    fn watermark_never_regresses() {
        let next = Stamp::parse("2024-01-02T00:00:00Z").unwrap();
        assert!(advances(None, &next));
        assert!(advances(Some("2024-01-01 00:00:00"), &next));
        assert!(!advances(Some("2024-01-02 00:00:00"), &next));
        assert!(!advances(Some("2024-01-03T00:00:00Z"), &next));
        assert!(advances(Some("not a time"), &next));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unconfigured_engine_is_offline_noop() {
        let db = Database::open_in_memory().await.unwrap();
        let engine = engine(&db, None);

        assert_eq!(engine.current_state(), SyncState::Offline);
        assert_eq!(engine.sync_all().await.unwrap(), SyncOutcome::NotConfigured);
        assert_eq!(engine.pull_only().await.unwrap(), SyncOutcome::NotConfigured);
        assert_eq!(engine.push_only().await.unwrap(), SyncOutcome::NotConfigured);
        assert_eq!(engine.current_state(), SyncState::Offline);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_concurrent_cycle_reports_already_running() {
        let db = Database::open_in_memory().await.unwrap();
        let engine = engine(&db, Some(InMemoryCloudStore::new()));

        let _guard = engine.running.try_lock().unwrap();
        assert_eq!(engine.sync_all().await.unwrap(), SyncOutcome::AlreadyRunning);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_cycle_visits_every_table_in_order() {
        let db = Database::open_in_memory().await.unwrap();
        let engine = engine(&db, Some(InMemoryCloudStore::new()));
        assert_eq!(engine.current_state(), SyncState::Idle);

        let SyncOutcome::Completed(report) = engine.sync_all().await.unwrap() else {
            panic!("expected a completed cycle");
        };
        let order: Vec<_> = report.tables.iter().map(|report| report.table).collect();
        assert_eq!(order, Table::SYNC_ORDER.to_vec());
        assert!(report.notified.is_empty());
        assert_eq!(engine.current_state(), SyncState::Synced);

        let checkpoints = engine.checkpoints().await.unwrap();
        assert_eq!(checkpoints.len(), 12);
        assert!(checkpoints.iter().all(|checkpoint| checkpoint.last_pull_at.is_none()));
    }
}
