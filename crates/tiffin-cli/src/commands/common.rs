use std::env;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tiffin_core::cloud::PostgrestCloudStore;
use tiffin_core::config::{CloudConfig, SyncSettings};
use tiffin_core::db::Database;
use tiffin_core::models::{SyncCheckpoint, SyncConflict};
use tiffin_core::sync::{SyncReport, TableReport};
use tiffin_core::SyncEngine;

use crate::error::CliError;

pub const ENV_DB_PATH: &str = "TIFFIN_DB_PATH";

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub table: String,
    pub row_id: String,
    pub direction: String,
    pub local_latest_at: i64,
    pub incoming_latest_at: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

#[derive(Debug, Serialize)]
pub struct SyncStatusItem {
    pub configured: bool,
    pub shop_id: String,
    pub cloud_url: Option<String>,
    pub tables: Vec<SyncCheckpoint>,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("tiffin").join("tiffin.db"))
        .ok_or_else(|| CliError::Config("failed to resolve data directory".to_string()))
}

pub async fn open_database(path: &Path) -> Result<Database, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(path).await?)
}

pub fn open_engine(
    db: &Database,
    config: &CloudConfig,
) -> Result<SyncEngine<PostgrestCloudStore>, CliError> {
    Ok(SyncEngine::from_config(
        db.connection().clone(),
        config,
        SyncSettings::default(),
    )?)
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        table: conflict.table_name.clone(),
        row_id: conflict.row_id.clone(),
        direction: conflict.direction.to_string(),
        local_latest_at: conflict.local_latest_at,
        incoming_latest_at: conflict.incoming_latest_at,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<4}  {:<4}  {}/{}  local={} incoming={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.direction,
                conflict.table_name,
                conflict.row_id,
                format_sync_timestamp(conflict.local_latest_at),
                format_sync_timestamp(conflict.incoming_latest_at)
            )
        })
        .collect()
}

pub fn format_checkpoint_lines(checkpoints: &[SyncCheckpoint]) -> Vec<String> {
    checkpoints
        .iter()
        .map(|checkpoint| {
            format!(
                "{:<20} pull={:<28} push={}",
                checkpoint.table_name,
                checkpoint.last_pull_at.as_deref().unwrap_or("-"),
                checkpoint.last_push_at.as_deref().unwrap_or("-")
            )
        })
        .collect()
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .tables
        .iter()
        .filter(|table| has_activity(table))
        .map(|table| {
            format!(
                "{:<20} fetched={} applied={} sent={} conflicts={}",
                table.table, table.fetched, table.applied, table.sent, table.conflicts
            )
        })
        .collect();
    lines.push(format!(
        "Sync completed: {} applied, {} sent, {} conflicts",
        report.applied(),
        report.sent(),
        report.conflicts()
    ));
    lines
}

const fn has_activity(table: &TableReport) -> bool {
    table.fetched > 0 || table.candidates > 0 || table.conflicts > 0
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}
