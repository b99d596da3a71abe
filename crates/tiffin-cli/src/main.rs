//! Tiffin CLI - sync administration for the point-of-sale store
//!
//! Runs sync cycles against the configured cloud store and inspects or
//! resets the local sync bookkeeping.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tiffin_core::config::CloudConfig;
use tiffin_core::SyncMode;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::common::resolve_db_path;
use crate::commands::sync::{
    run_sync, run_sync_conflicts, run_sync_reset, run_sync_status, run_sync_watch,
};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt().with_env_filter(log_filter()).init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path)?;
    let config = CloudConfig::from_env();

    match cli.command {
        Commands::Sync {
            command,
            pull_only,
            push_only,
        } => {
            let mode = if pull_only {
                SyncMode::PullOnly
            } else if push_only {
                SyncMode::PushOnly
            } else {
                SyncMode::Full
            };

            match command {
                None => run_sync(mode, &config, &db_path).await?,
                Some(SyncCommands::Watch { interval }) => {
                    run_sync_watch(mode, interval, &config, &db_path).await?;
                }
                Some(SyncCommands::Status { json }) => {
                    run_sync_status(json, &config, &db_path).await?;
                }
                Some(SyncCommands::Conflicts { limit, json }) => {
                    run_sync_conflicts(limit, json, &db_path).await?;
                }
                Some(SyncCommands::Reset { push, pull, table }) => {
                    run_sync_reset(push, pull, table.as_deref(), &db_path).await?;
                }
            }
        }
    }

    Ok(())
}

fn log_filter() -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    for directive in ["tiffin=info", "sync=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}
