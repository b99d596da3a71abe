use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tiffin_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Watch interval must be at least one second")]
    InvalidInterval,
    #[error(
        "Sync is not configured. Set TIFFIN_CLOUD_URL and TIFFIN_CLOUD_KEY (a .env file in the working directory also works)."
    )]
    SyncNotConfigured,
}
