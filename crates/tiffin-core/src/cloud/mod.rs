//! Row-oriented access to the cloud table API.
//!
//! The sync engine only needs two verbs from the cloud: a filtered select
//! and an upsert keyed on `id`. [`PostgrestCloudStore`] speaks the
//! Supabase/PostgREST dialect over HTTP; [`InMemoryCloudStore`] keeps rows
//! in process for tests and offline demos.

mod memory;
mod postgrest;

use serde_json::Value;
use thiserror::Error;

use crate::models::{Row, Table};

pub use memory::InMemoryCloudStore;
pub use postgrest::{PostgrestCloudStore, query_params};

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("Invalid cloud configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Cloud HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Cloud API error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("Invalid cloud payload: {0}")]
    InvalidPayload(String),
    #[error("Cloud store unavailable: {0}")]
    Unavailable(String),
}

pub type CloudResult<T> = Result<T, CloudError>;

/// Row predicate understood by every cloud store.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq { column: String, value: Value },
    /// `column IN (values)`
    In { column: String, values: Vec<String> },
    /// Any of `columns` is at or after `instant`
    AtOrAfter { columns: Vec<String>, instant: String },
    /// Rows tagged with `shop_id`, or not tagged at all
    ShopScope { shop_id: String },
    /// Rows sorting strictly after `(column, id)` under ascending order
    /// with nulls last
    KeysetAfter {
        column: String,
        value: Option<String>,
        id: String,
    },
}

/// A select request against one cloud table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloudQuery {
    /// Columns to return; empty means all
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    /// Ascending sort keys, applied in order
    pub order: Vec<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl CloudQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|column| (*column).to_string()).collect();
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq {
            column: column.to_string(),
            value: value.into(),
        })
    }

    #[must_use]
    pub fn is_in(self, column: &str, values: Vec<String>) -> Self {
        self.filter(Filter::In {
            column: column.to_string(),
            values,
        })
    }

    #[must_use]
    pub fn after(self, column: &str, value: Option<&str>, id: &str) -> Self {
        self.filter(Filter::KeysetAfter {
            column: column.to_string(),
            value: value.map(str::to_string),
            id: id.to_string(),
        })
    }

    #[must_use]
    pub fn order_by(mut self, column: &str) -> Self {
        self.order.push(column.to_string());
        self
    }

    #[must_use]
    pub const fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }
}

/// Remote table API used by the sync engine.
#[allow(async_fn_in_trait)]
pub trait CloudStore {
    /// Fetch rows matching the query
    async fn select(&self, table: Table, query: &CloudQuery) -> CloudResult<Vec<Row>>;

    /// Insert or merge rows by primary key `id`
    async fn upsert(&self, table: Table, rows: &[Row]) -> CloudResult<()>;
}
