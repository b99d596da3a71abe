//! tiffin-core - Core library for Tiffin
//!
//! This crate contains the local store, the table catalogue, and the
//! bidirectional sync engine that replicates the point-of-sale tables
//! between the device and the cloud.

pub mod cloud;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Row, Table};
pub use state::{SyncMode, SyncPhase, SyncState};
pub use sync::{SchemaMapper, SyncEngine, SyncOutcome, SyncReport};
