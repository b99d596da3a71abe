use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use tiffin_core::config::CloudConfig;
use tiffin_core::{SyncMode, SyncOutcome, Table};

use crate::commands::common::{
    format_checkpoint_lines, format_report_lines, format_sync_conflict_lines, open_database,
    open_engine, sync_conflict_to_item, SyncConflictItem, SyncStatusItem,
};
use crate::error::CliError;

pub async fn run_sync(mode: SyncMode, config: &CloudConfig, db_path: &Path) -> Result<(), CliError> {
    if !config.is_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let db = open_database(db_path).await?;
    let engine = open_engine(&db, config)?;

    match engine.run(mode).await? {
        SyncOutcome::Completed(report) => {
            for line in format_report_lines(&report) {
                println!("{line}");
            }
        }
        SyncOutcome::AlreadyRunning => println!("Sync already in progress"),
        SyncOutcome::NotConfigured => return Err(CliError::SyncNotConfigured),
    }
    Ok(())
}

pub async fn run_sync_watch(
    mode: SyncMode,
    interval_secs: u64,
    config: &CloudConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    if interval_secs == 0 {
        return Err(CliError::InvalidInterval);
    }
    if !config.is_configured() {
        return Err(CliError::SyncNotConfigured);
    }

    let db = open_database(db_path).await?;
    let engine = open_engine(&db, config)?;
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));

    println!("Syncing every {interval_secs}s, press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed cycle is retried on the next tick from the stored watermarks.
                match engine.run(mode).await {
                    Ok(SyncOutcome::Completed(report)) => {
                        tracing::info!(
                            applied = report.applied(),
                            sent = report.sent(),
                            "Watch cycle completed"
                        );
                    }
                    Ok(_) => {}
                    Err(error) => tracing::error!(error = %error, "Watch cycle failed"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                println!("Stopping sync watch");
                break;
            }
        }
    }
    Ok(())
}

pub async fn run_sync_status(
    as_json: bool,
    config: &CloudConfig,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let engine = open_engine(&db, config)?;
    let checkpoints = engine.checkpoints().await?;

    if as_json {
        let status = SyncStatusItem {
            configured: engine.is_configured(),
            shop_id: engine.shop_id().to_string(),
            cloud_url: config.url.clone(),
            tables: checkpoints,
        };
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    match config.url.as_deref() {
        Some(url) if engine.is_configured() => println!("Cloud: {url} (shop {})", engine.shop_id()),
        _ => println!("Cloud: not configured (offline only)"),
    }
    for line in format_checkpoint_lines(&checkpoints) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_sync_conflicts(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let engine = open_engine(&db, &CloudConfig::default())?;
    let conflicts = engine.conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_sync_reset(
    push: bool,
    pull: bool,
    table: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let table = table.map(Table::from_str).transpose()?;
    // Neither flag resets both directions.
    let (push, pull) = if push || pull { (push, pull) } else { (true, true) };

    let db = open_database(db_path).await?;
    let engine = open_engine(&db, &CloudConfig::default())?;
    if push {
        engine.reset_push(table).await?;
    }
    if pull {
        engine.reset_pull(table).await?;
    }

    let scope = table.map_or_else(|| "all tables".to_string(), |table| table.to_string());
    let directions = match (push, pull) {
        (true, true) => "push and pull",
        (true, false) => "push",
        _ => "pull",
    };
    println!("Reset {directions} watermarks for {scope}");
    Ok(())
}
