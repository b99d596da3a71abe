//! Sync checkpoint repository implementation

use crate::error::Result;
use crate::models::{CheckpointUpdate, SyncCheckpoint, Table};
use libsql::params::Params;
use libsql::Connection;

use super::{text_or_null, value_to_text};

/// Trait for checkpoint storage operations (async)
#[allow(async_fn_in_trait)]
pub trait CheckpointRepository {
    /// Load a table's checkpoint; missing rows yield empty watermarks
    async fn get(&self, table: Table) -> Result<SyncCheckpoint>;

    /// Merge the given watermarks into the stored checkpoint
    async fn set(&self, table: Table, update: CheckpointUpdate) -> Result<SyncCheckpoint>;

    /// Clear the push watermark for one table, or all tables
    async fn reset_push(&self, table: Option<Table>) -> Result<()>;

    /// Clear the pull watermark for one table, or all tables
    async fn reset_pull(&self, table: Option<Table>) -> Result<()>;

    /// List stored checkpoints ordered by table name
    async fn list(&self) -> Result<Vec<SyncCheckpoint>>;
}

/// libSQL implementation of `CheckpointRepository`
pub struct LibSqlCheckpointRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCheckpointRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_checkpoint(row: &libsql::Row) -> Result<SyncCheckpoint> {
        Ok(SyncCheckpoint {
            table_name: row.get::<String>(0)?,
            last_push_at: value_to_text(row.get_value(1)?),
            last_pull_at: value_to_text(row.get_value(2)?),
        })
    }

    async fn reset_column(&self, column: &str, table: Option<Table>) -> Result<()> {
        match table {
            Some(table) => {
                self.conn
                    .execute(
                        &format!("UPDATE sync_checkpoints SET {column} = NULL WHERE tableName = ?"),
                        [table.name()],
                    )
                    .await?;
            }
            None => {
                self.conn
                    .execute(&format!("UPDATE sync_checkpoints SET {column} = NULL"), ())
                    .await?;
            }
        }
        Ok(())
    }
}

impl CheckpointRepository for LibSqlCheckpointRepository<'_> {
    async fn get(&self, table: Table) -> Result<SyncCheckpoint> {
        let mut rows = self
            .conn
            .query(
                "SELECT tableName, lastPushAt, lastPullAt FROM sync_checkpoints WHERE tableName = ?",
                [table.name()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Self::parse_checkpoint(&row),
            None => Ok(SyncCheckpoint::empty(table.name())),
        }
    }

    async fn set(&self, table: Table, update: CheckpointUpdate) -> Result<SyncCheckpoint> {
        let current = self.get(table).await?;
        let merged = SyncCheckpoint {
            table_name: table.name().to_string(),
            last_push_at: update.last_push_at.or(current.last_push_at),
            last_pull_at: update.last_pull_at.or(current.last_pull_at),
        };

        self.conn
            .execute(
                "INSERT INTO sync_checkpoints (tableName, lastPushAt, lastPullAt) VALUES (?1, ?2, ?3)
                 ON CONFLICT(tableName) DO UPDATE SET
                    lastPushAt = excluded.lastPushAt,
                    lastPullAt = excluded.lastPullAt",
                Params::Positional(vec![
                    libsql::Value::Text(merged.table_name.clone()),
                    text_or_null(merged.last_push_at.as_deref()),
                    text_or_null(merged.last_pull_at.as_deref()),
                ]),
            )
            .await?;

        Ok(merged)
    }

    async fn reset_push(&self, table: Option<Table>) -> Result<()> {
        self.reset_column("lastPushAt", table).await
    }

    async fn reset_pull(&self, table: Option<Table>) -> Result<()> {
        self.reset_column("lastPullAt", table).await
    }

    async fn list(&self) -> Result<Vec<SyncCheckpoint>> {
        let mut rows = self
            .conn
            .query(
                "SELECT tableName, lastPushAt, lastPullAt FROM sync_checkpoints ORDER BY tableName",
                (),
            )
            .await?;

        let mut checkpoints = Vec::new();
        while let Some(row) = rows.next().await? {
            checkpoints.push(Self::parse_checkpoint(&row)?);
        }
        Ok(checkpoints)
    }
}
