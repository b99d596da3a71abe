//! Bidirectional sync between the local store and the cloud.

mod cloud;
mod engine;
mod local;
mod mapper;
pub mod resolve;
pub mod timestamp;

pub use cloud::{CloudChangeReader, CloudUpsertWriter, PullBatch, PushOutcome};
pub use engine::{SyncEngine, SyncOutcome, SyncReport, TableReport};
pub use local::{upsert_local, ApplyOutcome, LocalApplyWriter, LocalChangeReader};
pub use mapper::SchemaMapper;
pub use timestamp::Stamp;
