//! Field mapping between local (camelCase) and cloud (snake_case) rows.

use serde_json::Value;

use crate::config::DEFAULT_SHOP_ID;
use crate::models::{ColumnKind, Row, Table};

const SHOP_ID_LOCAL: &str = "shopId";
const SHOP_ID_CLOUD: &str = "shop_id";

/// Translates rows between the two stores for a single shop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMapper {
    shop_id: String,
}

impl Default for SchemaMapper {
    fn default() -> Self {
        Self::new(DEFAULT_SHOP_ID)
    }
}

impl SchemaMapper {
    pub fn new(shop_id: impl Into<String>) -> Self {
        Self {
            shop_id: shop_id.into(),
        }
    }

    pub fn shop_id(&self) -> &str {
        &self.shop_id
    }

    /// Shape a local row for upload.
    ///
    /// Fields outside the column list are dropped and the cloud-assigned
    /// sequence column is never sent.
    pub fn to_cloud_shape(&self, table: Table, local: &Row) -> Row {
        let sequence = table.sequence_column().map(|column| column.local);
        let mut cloud = Row::new();

        for column in table.columns() {
            if Some(column.local) == sequence {
                continue;
            }
            let Some(value) = local.get(column.local) else {
                continue;
            };
            let value = match column.kind {
                ColumnKind::Boolean => integer_to_bool(value),
                _ => value.clone(),
            };
            cloud.insert(column.cloud.to_string(), value);
        }

        if cloud.get(SHOP_ID_CLOUD).is_none_or(Value::is_null) {
            cloud.insert(SHOP_ID_CLOUD.to_string(), Value::String(self.shop_id.clone()));
        }
        cloud
    }

    /// Shape a cloud row for the local store, keeping allow-listed fields only.
    pub fn to_local_shape(&self, table: Table, cloud: &Row) -> Row {
        let mut local = Row::new();

        for column in table.columns() {
            let Some(value) = cloud.get(column.cloud) else {
                continue;
            };
            let value = match column.kind {
                ColumnKind::Boolean => bool_to_integer(value),
                _ => value.clone(),
            };
            local.insert(column.local.to_string(), value);
        }

        if local.get(SHOP_ID_LOCAL).is_none_or(Value::is_null) {
            local.insert(SHOP_ID_LOCAL.to_string(), Value::String(self.shop_id.clone()));
        }
        local
    }
}

fn integer_to_bool(value: &Value) -> Value {
    match value {
        Value::Number(number) => Value::Bool(number.as_f64().is_some_and(|n| n != 0.0)),
        other => other.clone(),
    }
}

fn bool_to_integer(value: &Value) -> Value {
    match value {
        Value::Bool(flag) => Value::from(i64::from(*flag)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Column;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn local_bill() -> Row {
        row(json!({
            "id": "b1",
            "createdAt": "2024-01-01 10:00:00",
            "updatedAt": "2024-01-01 10:05:00",
            "deletedAt": null,
            "shopId": "shop_1",
            "billNumber": 17,
            "customerId": "c1",
            "subtotal": 100.0,
            "discount": 0.0,
            "tax": 5.0,
            "total": 105.0,
            "status": "paid",
            "paymentMode": "cash"
        }))
    }

    #[test]
    fn to_cloud_renames_and_omits_sequence() {
        let cloud = SchemaMapper::default().to_cloud_shape(Table::Bills, &local_bill());

        assert_eq!(cloud.get("payment_mode"), Some(&json!("cash")));
        assert_eq!(cloud.get("customer_id"), Some(&json!("c1")));
        assert_eq!(cloud.get("updated_at"), Some(&json!("2024-01-01 10:05:00")));
        assert!(!cloud.contains_key("bill_number"));
        assert!(!cloud.contains_key("billNumber"));
        assert!(!cloud.contains_key("paymentMode"));
    }

    #[test]
    fn to_cloud_drops_unknown_local_fields() {
        let mut bill = local_bill();
        bill.insert("printedAt".into(), json!("2024-01-01 10:06:00"));
        let cloud = SchemaMapper::default().to_cloud_shape(Table::Bills, &bill);
        assert!(!cloud.contains_key("printedAt"));
        assert!(!cloud.contains_key("printed_at"));
    }

    #[test]
    fn to_cloud_injects_shop_when_missing() {
        let mut bill = local_bill();
        bill.insert("shopId".into(), Value::Null);
        let cloud = SchemaMapper::new("shop_9").to_cloud_shape(Table::Bills, &bill);
        assert_eq!(cloud.get("shop_id"), Some(&json!("shop_9")));

        bill.remove("shopId");
        let cloud = SchemaMapper::new("shop_9").to_cloud_shape(Table::Bills, &bill);
        assert_eq!(cloud.get("shop_id"), Some(&json!("shop_9")));
    }

    #[test]
    fn booleans_convert_both_ways() {
        let mapper = SchemaMapper::default();
        let local = row(json!({"id": "m1", "name": "Idli", "isAvailable": 0}));
        let cloud = mapper.to_cloud_shape(Table::MenuItems, &local);
        assert_eq!(cloud.get("is_available"), Some(&json!(false)));

        let back = mapper.to_local_shape(Table::MenuItems, &row(json!({"id": "m1", "is_available": true})));
        assert_eq!(back.get("isAvailable"), Some(&json!(1)));
    }

    #[test]
    fn to_local_drops_unknown_fields() {
        let cloud = row(json!({
            "id": "c1",
            "name": "Asha",
            "updated_at": "2024-01-01T00:00:00Z",
            "loyalty_tier": "gold",
            "shop_id": "shop_1"
        }));
        let local = SchemaMapper::default().to_local_shape(Table::Customers, &cloud);

        assert_eq!(
            Value::Object(local),
            json!({
                "id": "c1",
                "updatedAt": "2024-01-01T00:00:00Z",
                "shopId": "shop_1",
                "name": "Asha"
            })
        );
    }

    fn sample_value(column: &Column, index: usize) -> Value {
        match column.kind {
            ColumnKind::Text => json!(format!("{}-{index}", column.local)),
            ColumnKind::Integer => json!(index + 1),
            ColumnKind::Real => json!(index as f64 + 0.5),
            ColumnKind::Boolean => json!(index % 2),
            ColumnKind::Timestamp => json!(format!("2024-01-01 10:{index:02}:00")),
        }
    }

    #[test]
    fn round_trip_restores_non_sequence_fields_for_every_table() {
        let mapper = SchemaMapper::default();

        for table in Table::SYNC_ORDER {
            let original: Row = table
                .columns()
                .iter()
                .enumerate()
                .map(|(index, column)| (column.local.to_string(), sample_value(column, index)))
                .collect();

            let cloud = mapper.to_cloud_shape(table, &original);
            if let Some(sequence) = table.sequence_column() {
                assert!(!cloud.contains_key(sequence.cloud), "{table} pushed {}", sequence.cloud);
            }
            let restored = mapper.to_local_shape(table, &cloud);

            let mut expected = original;
            if let Some(sequence) = table.sequence_column() {
                expected.remove(sequence.local);
            }
            assert_eq!(restored, expected, "round trip of {table}");
        }
    }

    #[test]
    fn round_trip_keeps_both_boolean_states() {
        let mapper = SchemaMapper::default();
        for flag in [0, 1] {
            let local = row(json!({"id": "m1", "isAvailable": flag, "shopId": "shop_1"}));
            let cloud = mapper.to_cloud_shape(Table::MenuItems, &local);
            assert_eq!(cloud.get("is_available"), Some(&json!(flag == 1)));
            assert_eq!(mapper.to_local_shape(Table::MenuItems, &cloud), local);
        }
    }

    #[test]
    fn sequence_numbers_flow_down_on_pull() {
        let cloud = row(json!({"id": "k1", "kot_number": 42, "shop_id": null}));
        let local = SchemaMapper::new("shop_3").to_local_shape(Table::Kots, &cloud);
        assert_eq!(local.get("kotNumber"), Some(&json!(42)));
        assert_eq!(local.get("shopId"), Some(&json!("shop_3")));
    }
}
