//! Sync conflict log

use crate::error::Result;
use crate::models::{ConflictDirection, NewSyncConflict, SyncConflict};
use crate::util::unix_millis_now;
use libsql::params::Params;
use libsql::{Connection, Value};

/// Strategy name recorded for timestamp-based resolutions
pub const LWW_STRATEGY: &str = "lww";

/// libSQL-backed log of last-writer-wins resolutions
pub struct LibSqlConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append a resolved conflict
    pub async fn record(&self, conflict: &NewSyncConflict) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_conflicts (
                    tableName, rowId, direction, localLatestAt, incomingLatestAt, resolvedAt, strategy
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                Params::Positional(vec![
                    Value::Text(conflict.table_name.clone()),
                    Value::Text(conflict.row_id.clone()),
                    Value::Text(conflict.direction.as_str().to_string()),
                    Value::Integer(conflict.local_latest_at),
                    Value::Integer(conflict.incoming_latest_at),
                    Value::Integer(unix_millis_now()),
                    Value::Text(LWW_STRATEGY.to_string()),
                ]),
            )
            .await?;
        Ok(())
    }

    /// Most recent conflicts first
    pub async fn list(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .query(
                "SELECT id, tableName, rowId, direction, localLatestAt, incomingLatestAt, resolvedAt, strategy
                 FROM sync_conflicts
                 ORDER BY resolvedAt DESC, id DESC
                 LIMIT ?",
                [limit],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            let direction: String = row.get(3)?;
            conflicts.push(SyncConflict {
                id: row.get(0)?,
                table_name: row.get(1)?,
                row_id: row.get(2)?,
                direction: ConflictDirection::parse(&direction).unwrap_or(ConflictDirection::Pull),
                local_latest_at: row.get(4)?,
                incoming_latest_at: row.get(5)?,
                resolved_at: row.get(6)?,
                strategy: row.get(7)?,
            });
        }
        Ok(conflicts)
    }
}
