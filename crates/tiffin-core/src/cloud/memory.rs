//! In-process cloud store.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{CloudError, CloudQuery, CloudResult, CloudStore, Filter};
use crate::models::{Row, Table, row_id};
use crate::sync::timestamp::to_epoch_millis;

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<Table, Vec<Row>>,
    upserts: HashMap<Table, Vec<Vec<Row>>>,
    failing: HashSet<Table>,
    selects: usize,
}

/// Cloud store backed by shared in-memory tables.
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another. Upserts merge into existing rows like PostgREST's
/// `merge-duplicates`, and new rows without a sequence number get the next
/// one.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCloudStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryCloudStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a row as if another device had pushed it.
    pub fn insert_row(&self, table: Table, row: Row) {
        let mut inner = self.lock();
        merge_row(inner.tables.entry(table).or_default(), table, row);
    }

    /// Current copy of a row by id.
    pub fn row(&self, table: Table, id: &str) -> Option<Row> {
        self.lock()
            .tables
            .get(&table)
            .and_then(|rows| rows.iter().find(|row| row_id(row).as_deref() == Some(id)))
            .cloned()
    }

    /// All rows of a table in insertion order.
    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.lock().tables.get(&table).cloned().unwrap_or_default()
    }

    /// Every upsert payload received for a table, oldest first.
    pub fn upserts(&self, table: Table) -> Vec<Vec<Row>> {
        self.lock().upserts.get(&table).cloned().unwrap_or_default()
    }

    /// Number of select requests served so far.
    pub fn select_count(&self) -> usize {
        self.lock().selects
    }

    /// Make every request against `table` fail until cleared.
    pub fn set_failing(&self, table: Table, failing: bool) {
        let mut inner = self.lock();
        if failing {
            inner.failing.insert(table);
        } else {
            inner.failing.remove(&table);
        }
    }

    fn check_available(inner: &Inner, table: Table) -> CloudResult<()> {
        if inner.failing.contains(&table) {
            Err(CloudError::Unavailable(format!("{table} is failing")))
        } else {
            Ok(())
        }
    }
}

impl CloudStore for InMemoryCloudStore {
    async fn select(&self, table: Table, query: &CloudQuery) -> CloudResult<Vec<Row>> {
        let mut inner = self.lock();
        inner.selects += 1;
        Self::check_available(&inner, table)?;

        let mut matched: Vec<Row> = inner
            .tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|filter| matches(row, filter)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        matched.sort_by(|left, right| {
            query
                .order
                .iter()
                .map(|column| compare_values(left.get(column), right.get(column)))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .map(|row| project(row, &query.columns))
            .collect())
    }

    async fn upsert(&self, table: Table, rows: &[Row]) -> CloudResult<()> {
        let mut inner = self.lock();
        Self::check_available(&inner, table)?;

        if rows.iter().any(|row| row_id(row).is_none()) {
            return Err(CloudError::Api {
                status: 400,
                message: format!("{table} upsert contains a row without id"),
            });
        }

        inner.upserts.entry(table).or_default().push(rows.to_vec());
        let stored = inner.tables.entry(table).or_default();
        for row in rows {
            merge_row(stored, table, row.clone());
        }
        Ok(())
    }
}

fn merge_row(stored: &mut Vec<Row>, table: Table, row: Row) {
    let id = row_id(&row);
    if let Some(existing) = stored.iter_mut().find(|candidate| row_id(candidate) == id) {
        existing.extend(row);
        return;
    }

    let mut row = row;
    if let Some(sequence) = table.sequence_column() {
        let missing = row.get(sequence.cloud).is_none_or(Value::is_null);
        if missing {
            let next = stored
                .iter()
                .filter_map(|existing| existing.get(sequence.cloud).and_then(Value::as_i64))
                .max()
                .unwrap_or(0)
                + 1;
            row.insert(sequence.cloud.to_string(), Value::from(next));
        }
    }
    stored.push(row);
}

fn matches(row: &Row, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { column, value } => row
            .get(column)
            .is_some_and(|actual| scalar_eq(actual, value)),
        Filter::In { column, values } => row.get(column).is_some_and(|actual| {
            values
                .iter()
                .any(|value| scalar_eq(actual, &Value::String(value.clone())))
        }),
        Filter::AtOrAfter { columns, instant } => {
            let Some(threshold) = to_epoch_millis(instant) else {
                return false;
            };
            columns.iter().any(|column| {
                row.get(column)
                    .and_then(Value::as_str)
                    .and_then(to_epoch_millis)
                    .is_some_and(|millis| millis >= threshold)
            })
        }
        Filter::ShopScope { shop_id } => match row.get("shop_id") {
            None | Some(Value::Null) => true,
            Some(value) => value.as_str() == Some(shop_id.as_str()),
        },
        Filter::KeysetAfter { column, value, id } => {
            let cursor = value.clone().map(Value::String);
            match compare_values(row.get(column), cursor.as_ref()) {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => {
                    compare_values(row.get("id"), Some(&Value::String(id.clone())))
                        == Ordering::Greater
                }
            }
        }
    }
}

fn scalar_eq(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(left), Value::String(right)) => left == right,
        (Value::Number(left), Value::String(right)) | (Value::String(right), Value::Number(left)) => {
            left.to_string() == *right
        }
        _ => actual == expected,
    }
}

// Postgres ascending order: nulls last, timestamps by instant.
fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.filter(|value| !value.is_null());
    let right = right.filter(|value| !value.is_null());
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(left)), Some(Value::Number(right))) => left
            .as_f64()
            .partial_cmp(&right.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(left)), Some(Value::String(right))) => {
            match (to_epoch_millis(left), to_epoch_millis(right)) {
                (Some(left), Some(right)) => left.cmp(&right),
                _ => left.cmp(right),
            }
        }
        (Some(left), Some(right)) => left.to_string().cmp(&right.to_string()),
    }
}

fn project(row: Row, columns: &[String]) -> Row {
    if columns.is_empty() {
        return row;
    }
    columns
        .iter()
        .map(|column| (column.clone(), row.get(column).cloned().unwrap_or(Value::Null)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn customer(id: &str, shop: Value, updated_at: &str) -> Row {
        row(json!({"id": id, "name": id, "shop_id": shop, "updated_at": updated_at, "deleted_at": null}))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn select_applies_scope_window_order_and_paging() {
        let store = InMemoryCloudStore::new();
        store.insert_row(Table::Customers, customer("c3", json!("shop_1"), "2024-01-03T00:00:00Z"));
        store.insert_row(Table::Customers, customer("c1", json!("shop_1"), "2024-01-01 00:00:00"));
        store.insert_row(Table::Customers, customer("c2", Value::Null, "2024-01-02T00:00:00Z"));
        store.insert_row(Table::Customers, customer("x1", json!("shop_2"), "2024-01-04T00:00:00Z"));

        let query = CloudQuery::new()
            .filter(Filter::ShopScope {
                shop_id: "shop_1".into(),
            })
            .filter(Filter::AtOrAfter {
                columns: vec!["updated_at".into(), "deleted_at".into()],
                instant: "2024-01-02T00:00:00Z".into(),
            })
            .order_by("updated_at")
            .order_by("id");

        let rows = store.select(Table::Customers, &query).await.unwrap();
        let ids: Vec<_> = rows.iter().filter_map(row_id).collect();
        assert_eq!(ids, vec!["c2", "c3"]);

        let page = store
            .select(Table::Customers, &query.clone().page(1, 1))
            .await
            .unwrap();
        assert_eq!(row_id(&page[0]).as_deref(), Some("c3"));
        assert_eq!(store.select_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn keyset_cursor_continues_after_position() {
        let store = InMemoryCloudStore::new();
        store.insert_row(Table::Customers, customer("a", json!("shop_1"), "2024-01-01T00:00:00Z"));
        store.insert_row(Table::Customers, customer("b", json!("shop_1"), "2024-01-02 00:00:00"));
        store.insert_row(Table::Customers, customer("c", json!("shop_1"), "2024-01-02T00:00:00Z"));
        store.insert_row(
            Table::Customers,
            row(json!({"id": "n", "name": "n", "shop_id": "shop_1", "updated_at": null})),
        );

        let ordered = CloudQuery::new().order_by("updated_at").order_by("id");
        let ids = |rows: Vec<Row>| rows.iter().filter_map(row_id).collect::<Vec<_>>();

        let after_b = store
            .select(
                Table::Customers,
                &ordered.clone().after("updated_at", Some("2024-01-02T00:00:00Z"), "b"),
            )
            .await
            .unwrap();
        assert_eq!(ids(after_b), vec!["c", "n"]);

        let after_null = store
            .select(Table::Customers, &ordered.clone().after("updated_at", None, "m"))
            .await
            .unwrap();
        assert_eq!(ids(after_null), vec!["n"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn select_projects_requested_columns() {
        let store = InMemoryCloudStore::new();
        store.insert_row(Table::Customers, customer("c1", json!("shop_1"), "2024-01-01T00:00:00Z"));

        let rows = store
            .select(
                Table::Customers,
                &CloudQuery::new()
                    .columns(&["id", "deleted_at"])
                    .is_in("id", vec!["c1".into(), "zz".into()]),
            )
            .await
            .unwrap();
        assert_eq!(Value::Object(rows[0].clone()), json!({"id": "c1", "deleted_at": null}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_merges_and_assigns_sequence_numbers() {
        let store = InMemoryCloudStore::new();
        store
            .upsert(
                Table::Bills,
                &[
                    row(json!({"id": "b1", "total": 10.0})),
                    row(json!({"id": "b2", "total": 20.0})),
                ],
            )
            .await
            .unwrap();
        store
            .upsert(Table::Bills, &[row(json!({"id": "b1", "status": "paid"}))])
            .await
            .unwrap();

        let b1 = store.row(Table::Bills, "b1").unwrap();
        assert_eq!(b1.get("bill_number"), Some(&json!(1)));
        assert_eq!(b1.get("total"), Some(&json!(10.0)));
        assert_eq!(b1.get("status"), Some(&json!("paid")));
        assert_eq!(
            store.row(Table::Bills, "b2").unwrap().get("bill_number"),
            Some(&json!(2))
        );
        assert_eq!(store.upserts(Table::Bills).len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_table_rejects_requests() {
        let store = InMemoryCloudStore::new();
        store.set_failing(Table::Kots, true);

        let error = store.select(Table::Kots, &CloudQuery::new()).await.unwrap_err();
        assert!(matches!(error, CloudError::Unavailable(_)));
        assert!(store.upsert(Table::Kots, &[row(json!({"id": "k1"}))]).await.is_err());

        store.set_failing(Table::Kots, false);
        assert!(store.select(Table::Kots, &CloudQuery::new()).await.unwrap().is_empty());
    }
}
