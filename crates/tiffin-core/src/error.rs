//! Error types for tiffin-core

use thiserror::Error;

use crate::cloud::CloudError;
use crate::models::Table;
use crate::state::SyncPhase;

/// Result type alias using tiffin-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tiffin-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local store in a state this build cannot use
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Cloud store error
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// A table pass failed; earlier tables stay committed
    #[error("Sync of {table} failed while {phase}: {source}")]
    SyncFailed {
        table: Table,
        phase: SyncPhase,
        #[source]
        source: Box<Error>,
    },

    /// Table name outside the synchronized set
    #[error("Unknown table: {0}")]
    UnknownTable(String),
}
