//! Database layer for Tiffin

mod checkpoint_repository;
mod conflict_repository;
mod connection;
mod migrations;
mod values;

pub use checkpoint_repository::{CheckpointRepository, LibSqlCheckpointRepository};
pub use conflict_repository::{LibSqlConflictRepository, LWW_STRATEGY};
pub use connection::Database;
pub use values::{collect_rows, json_to_sql, sql_to_json, text_or_null, value_to_text};
