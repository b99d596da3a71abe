use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tiffin")]
#[command(about = "Sync the Tiffin point-of-sale store with the cloud")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a sync cycle against the configured cloud store
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Only download cloud changes
        #[arg(long, conflicts_with = "push_only")]
        pull_only: bool,
        /// Only upload local changes
        #[arg(long)]
        push_only: bool,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Run sync cycles periodically until interrupted
    Watch {
        /// Seconds between cycles
        #[arg(short, long, default_value = "60")]
        interval: u64,
    },
    /// Show configuration and per-table watermarks
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear sync watermarks so rows are reconsidered
    Reset {
        /// Reset the push watermark
        #[arg(long)]
        push: bool,
        /// Reset the pull watermark
        #[arg(long)]
        pull: bool,
        /// Limit the reset to one table (all tables when omitted)
        #[arg(long, value_name = "TABLE")]
        table: Option<String>,
    },
}
