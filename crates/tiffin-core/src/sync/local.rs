//! Local side of the sync: change detection and transactional apply.

use std::future::Future;
use std::pin::Pin;

use libsql::params::Params;
use libsql::Connection;
use serde_json::Value;

use super::mapper::SchemaMapper;
use super::resolve::{apply_decision, ApplyDecision, RowActivity};
use super::timestamp::{normalize, to_epoch_millis};
use crate::cloud::{CloudQuery, CloudStore};
use crate::db::{collect_rows, json_to_sql, LibSqlConflictRepository};
use crate::error::Result;
use crate::models::{
    row_id, text_field, ColumnKind, ConflictDirection, NewSyncConflict, Row, Table,
};

/// Reads rows changed locally after a watermark.
pub struct LocalChangeReader<'a> {
    conn: &'a Connection,
}

impl<'a> LocalChangeReader<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Rows updated or soft-deleted strictly after `since`, oldest first.
    ///
    /// Without a usable watermark every row is returned.
    pub async fn read(&self, table: Table, since: Option<&str>) -> Result<Vec<Row>> {
        let columns = column_list(table);
        let since = match since {
            Some(raw) => {
                let normalized = normalize(raw);
                if normalized.is_none() {
                    tracing::warn!(
                        target: "sync::local",
                        table = %table,
                        watermark = raw,
                        "Ignoring unparseable push watermark"
                    );
                }
                normalized
            }
            None => None,
        };

        let rows = match since {
            Some(since) => {
                let sql = format!(
                    "SELECT {columns} FROM {table}
                     WHERE julianday(updatedAt) > julianday(?1)
                        OR (deletedAt IS NOT NULL AND julianday(deletedAt) > julianday(?1))
                     ORDER BY julianday(updatedAt) ASC, id ASC",
                    table = table.name()
                );
                self.conn.query(&sql, [since.as_str()]).await?
            }
            None => {
                let sql = format!(
                    "SELECT {columns} FROM {table} ORDER BY julianday(updatedAt) ASC, id ASC",
                    table = table.name()
                );
                self.conn.query(&sql, ()).await?
            }
        };

        collect_rows(rows).await
    }
}

/// Counts from one apply pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub received: usize,
    pub applied: usize,
    pub skipped: usize,
    /// Skips where the local row was strictly newer
    pub conflicts: usize,
    /// Parent rows fetched from the cloud to satisfy foreign keys
    pub backfilled: usize,
}

type BoxedResult<'b, T> = Pin<Box<dyn Future<Output = Result<T>> + 'b>>;

/// Applies pulled cloud rows to the local store.
pub struct LocalApplyWriter<'a, C> {
    conn: &'a Connection,
    cloud: &'a C,
    mapper: &'a SchemaMapper,
}

impl<'a, C: CloudStore> LocalApplyWriter<'a, C> {
    pub const fn new(conn: &'a Connection, cloud: &'a C, mapper: &'a SchemaMapper) -> Self {
        Self {
            conn,
            cloud,
            mapper,
        }
    }

    /// Apply a batch inside one immediate transaction.
    ///
    /// Any failure rolls back the whole batch.
    pub async fn apply(&self, table: Table, rows: &[Row]) -> Result<ApplyOutcome> {
        if rows.is_empty() {
            return Ok(ApplyOutcome::default());
        }

        self.conn.execute("BEGIN IMMEDIATE", ()).await?;

        let mut outcome = ApplyOutcome {
            received: rows.len(),
            ..ApplyOutcome::default()
        };
        for row in rows {
            if let Err(error) = self.apply_row(table, row, &mut outcome).await {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(error);
            }
        }

        if let Err(error) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(error.into());
        }

        tracing::debug!(
            target: "sync::local",
            table = %table,
            received = outcome.received,
            applied = outcome.applied,
            skipped = outcome.skipped,
            backfilled = outcome.backfilled,
            "Applied pulled rows"
        );
        Ok(outcome)
    }

    async fn apply_row(&self, table: Table, cloud_row: &Row, outcome: &mut ApplyOutcome) -> Result<()> {
        let local = self.mapper.to_local_shape(table, cloud_row);
        let Some(id) = row_id(&local) else {
            tracing::warn!(target: "sync::local", table = %table, "Skipping pulled row without id");
            outcome.skipped += 1;
            return Ok(());
        };

        outcome.backfilled += self.ensure_parents(table, &local).await?;

        let existing = self.load_row(table, &id).await?;
        let decision = apply_decision(
            existing.as_ref().map(RowActivity::local),
            RowActivity::cloud(cloud_row),
        );
        match decision {
            ApplyDecision::Apply
                if existing
                    .as_ref()
                    .is_some_and(|current| already_current(table, current, &local)) =>
            {
                outcome.skipped += 1;
            }
            ApplyDecision::Apply => {
                upsert_local(self.conn, table, &local).await?;
                outcome.applied += 1;
            }
            ApplyDecision::Skip => outcome.skipped += 1,
            ApplyDecision::LocalNewer { local, cloud } => {
                LibSqlConflictRepository::new(self.conn)
                    .record(&NewSyncConflict {
                        table_name: table.name().to_string(),
                        row_id: id,
                        direction: ConflictDirection::Pull,
                        local_latest_at: local,
                        incoming_latest_at: cloud,
                    })
                    .await?;
                outcome.skipped += 1;
                outcome.conflicts += 1;
            }
        }
        Ok(())
    }

    async fn load_row(&self, table: Table, id: &str) -> Result<Option<Row>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            column_list(table),
            table.name()
        );
        let rows = collect_rows(self.conn.query(&sql, [id]).await?).await?;
        Ok(rows.into_iter().next())
    }

    async fn exists_locally(&self, table: Table, id: &str) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1", table.name());
        let mut rows = self.conn.query(&sql, [id]).await?;
        Ok(rows.next().await?.is_some())
    }

    /// Backfill every missing parent of `row`, returning how many rows were inserted.
    fn ensure_parents<'b>(&'b self, table: Table, row: &'b Row) -> BoxedResult<'b, usize>
    where
        C: 'b,
    {
        Box::pin(async move {
            let mut inserted = 0;
            for foreign_key in table.foreign_keys() {
                let Some(parent_id) = text_field(row, foreign_key.column) else {
                    continue;
                };
                if self.exists_locally(foreign_key.parent, parent_id).await? {
                    continue;
                }
                inserted += self.backfill_parent(foreign_key.parent, parent_id).await?;
            }
            Ok(inserted)
        })
    }

    async fn backfill_parent(&self, parent: Table, id: &str) -> Result<usize> {
        let query = CloudQuery::new().eq("id", id).page(0, 1);
        let fetched = match self.cloud.select(parent, &query).await {
            Ok(rows) => rows,
            Err(error) => {
                tracing::warn!(
                    target: "sync::local",
                    table = %parent,
                    id,
                    error = %error,
                    "Failed to backfill parent row"
                );
                return Ok(0);
            }
        };

        let Some(cloud_row) = fetched.first() else {
            tracing::warn!(
                target: "sync::local",
                table = %parent,
                id,
                "Parent row missing in cloud"
            );
            return Ok(0);
        };

        let local = self.mapper.to_local_shape(parent, cloud_row);
        let ancestors = self.ensure_parents(parent, &local).await?;
        upsert_local(self.conn, parent, &local).await?;

        tracing::debug!(target: "sync::local", table = %parent, id, "Backfilled parent row");
        Ok(ancestors + 1)
    }
}

/// Insert a row or overwrite the columns it carries.
pub async fn upsert_local(conn: &Connection, table: Table, row: &Row) -> Result<()> {
    let columns: Vec<&str> = table
        .columns()
        .iter()
        .map(|column| column.local)
        .filter(|name| row.contains_key(*name))
        .collect();

    let placeholders = (1..=columns.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = columns
        .iter()
        .filter(|name| **name != "id")
        .map(|name| format!("{name} = excluded.{name}"))
        .collect::<Vec<_>>();

    let conflict_clause = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT(id) {conflict_clause}",
        table.name(),
        columns.join(", "),
    );

    let values = columns
        .iter()
        .map(|name| row.get(*name).map(json_to_sql).unwrap_or(libsql::Value::Null))
        .collect();
    conn.execute(&sql, Params::Positional(values)).await?;
    Ok(())
}

/// True when every field of `incoming` already holds the same value locally.
/// Timestamps compare by instant.
fn already_current(table: Table, current: &Row, incoming: &Row) -> bool {
    incoming.iter().all(|(name, value)| {
        let held = current.get(name).unwrap_or(&Value::Null);
        let timestamp = table
            .local_column(name)
            .is_some_and(|column| column.kind == ColumnKind::Timestamp);
        match (held, value) {
            (Value::String(held), Value::String(value)) if timestamp => {
                match (to_epoch_millis(held), to_epoch_millis(value)) {
                    (Some(held), Some(value)) => held == value,
                    _ => held == value,
                }
            }
            _ => held == value,
        }
    })
}

fn column_list(table: Table) -> String {
    table
        .columns()
        .iter()
        .map(|column| column.local)
        .collect::<Vec<_>>()
        .join(", ")
}
