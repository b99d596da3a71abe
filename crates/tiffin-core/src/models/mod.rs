//! Data models for Tiffin sync

mod checkpoint;
mod row;
mod sync_conflict;
mod table;

pub use checkpoint::{CheckpointUpdate, SyncCheckpoint};
pub use row::{row_id, text_field, Row};
pub use sync_conflict::{ConflictDirection, NewSyncConflict, SyncConflict};
pub use table::{Column, ColumnKind, ForeignKey, SyncDomain, Table};
