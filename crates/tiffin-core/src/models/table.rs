//! Synchronized table catalogue
//!
//! Every business table shares the same five bookkeeping columns (`id`,
//! `createdAt`, `updatedAt`, `deletedAt`, `shopId`) followed by its domain
//! columns. The column lists double as the pull allow-list: a cloud field
//! with no entry here never reaches the local store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How a column's value is represented on each side of the sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
    /// `0`/`1` locally, JSON boolean in the cloud
    Boolean,
    Timestamp,
}

/// A column known to both stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// camelCase name used by the local store
    pub local: &'static str,
    /// snake_case name used by the cloud store
    pub cloud: &'static str,
    pub kind: ColumnKind,
}

/// A nullable reference from a child column to a parent table's `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    /// Local column holding the parent id
    pub column: &'static str,
    pub parent: Table,
}

/// Business domain notified after rows of its tables change locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDomain {
    Orders,
    Bills,
    Payments,
    Expenses,
    Customers,
}

impl fmt::Display for SyncDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Orders => "orders",
            Self::Bills => "bills",
            Self::Payments => "payments",
            Self::Expenses => "expenses",
            Self::Customers => "customers",
        };
        f.write_str(name)
    }
}

/// Tables replicated between the local store and the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Customers,
    MenuItems,
    Kots,
    KotItems,
    Bills,
    BillItems,
    Payments,
    Receipts,
    SplitPayments,
    Expenses,
    ExpenseSettlements,
    CustomerAdvances,
}

macro_rules! columns {
    ($($local:literal => $cloud:literal : $kind:ident),* $(,)?) => {
        &[
            Column { local: "id", cloud: "id", kind: ColumnKind::Text },
            Column { local: "createdAt", cloud: "created_at", kind: ColumnKind::Timestamp },
            Column { local: "updatedAt", cloud: "updated_at", kind: ColumnKind::Timestamp },
            Column { local: "deletedAt", cloud: "deleted_at", kind: ColumnKind::Timestamp },
            Column { local: "shopId", cloud: "shop_id", kind: ColumnKind::Text },
            $(Column { local: $local, cloud: $cloud, kind: ColumnKind::$kind },)*
        ]
    };
}

const CUSTOMER_COLUMNS: &[Column] = columns![
    "name" => "name": Text,
    "phone" => "phone": Text,
    "email" => "email": Text,
    "creditLimit" => "credit_limit": Real,
    "notes" => "notes": Text,
];

const MENU_ITEM_COLUMNS: &[Column] = columns![
    "name" => "name": Text,
    "category" => "category": Text,
    "price" => "price": Real,
    "isAvailable" => "is_available": Boolean,
];

const KOT_COLUMNS: &[Column] = columns![
    "kotNumber" => "kot_number": Integer,
    "customerId" => "customer_id": Text,
    "tableLabel" => "table_label": Text,
    "status" => "status": Text,
    "notes" => "notes": Text,
];

const KOT_ITEM_COLUMNS: &[Column] = columns![
    "kotId" => "kot_id": Text,
    "menuItemId" => "menu_item_id": Text,
    "itemName" => "item_name": Text,
    "quantity" => "quantity": Integer,
    "unitPrice" => "unit_price": Real,
];

const BILL_COLUMNS: &[Column] = columns![
    "billNumber" => "bill_number": Integer,
    "customerId" => "customer_id": Text,
    "subtotal" => "subtotal": Real,
    "discount" => "discount": Real,
    "tax" => "tax": Real,
    "total" => "total": Real,
    "status" => "status": Text,
    "paymentMode" => "payment_mode": Text,
];

const BILL_ITEM_COLUMNS: &[Column] = columns![
    "billId" => "bill_id": Text,
    "menuItemId" => "menu_item_id": Text,
    "itemName" => "item_name": Text,
    "quantity" => "quantity": Integer,
    "unitPrice" => "unit_price": Real,
    "lineTotal" => "line_total": Real,
];

const PAYMENT_COLUMNS: &[Column] = columns![
    "billId" => "bill_id": Text,
    "customerId" => "customer_id": Text,
    "amount" => "amount": Real,
    "mode" => "mode": Text,
    "paidAt" => "paid_at": Timestamp,
];

const RECEIPT_COLUMNS: &[Column] = columns![
    "receiptNumber" => "receipt_number": Integer,
    "customerId" => "customer_id": Text,
    "amount" => "amount": Real,
    "mode" => "mode": Text,
    "notes" => "notes": Text,
];

const SPLIT_PAYMENT_COLUMNS: &[Column] = columns![
    "receiptId" => "receipt_id": Text,
    "mode" => "mode": Text,
    "amount" => "amount": Real,
];

const EXPENSE_COLUMNS: &[Column] = columns![
    "voucherNumber" => "voucher_number": Integer,
    "category" => "category": Text,
    "description" => "description": Text,
    "amount" => "amount": Real,
    "expenseDate" => "expense_date": Text,
    "paidBy" => "paid_by": Text,
];

const EXPENSE_SETTLEMENT_COLUMNS: &[Column] = columns![
    "expenseId" => "expense_id": Text,
    "amount" => "amount": Real,
    "mode" => "mode": Text,
    "settledAt" => "settled_at": Timestamp,
];

const CUSTOMER_ADVANCE_COLUMNS: &[Column] = columns![
    "customerId" => "customer_id": Text,
    "billId" => "bill_id": Text,
    "entryType" => "entry_type": Text,
    "amount" => "amount": Real,
    "notes" => "notes": Text,
];

const fn fk(column: &'static str, parent: Table) -> ForeignKey {
    ForeignKey { column, parent }
}

const KOT_FKS: &[ForeignKey] = &[fk("customerId", Table::Customers)];
const KOT_ITEM_FKS: &[ForeignKey] = &[
    fk("kotId", Table::Kots),
    fk("menuItemId", Table::MenuItems),
];
const BILL_FKS: &[ForeignKey] = &[fk("customerId", Table::Customers)];
const BILL_ITEM_FKS: &[ForeignKey] = &[
    fk("billId", Table::Bills),
    fk("menuItemId", Table::MenuItems),
];
const PAYMENT_FKS: &[ForeignKey] = &[
    fk("billId", Table::Bills),
    fk("customerId", Table::Customers),
];
const RECEIPT_FKS: &[ForeignKey] = &[fk("customerId", Table::Customers)];
const SPLIT_PAYMENT_FKS: &[ForeignKey] = &[fk("receiptId", Table::Receipts)];
const EXPENSE_SETTLEMENT_FKS: &[ForeignKey] = &[fk("expenseId", Table::Expenses)];
const CUSTOMER_ADVANCE_FKS: &[ForeignKey] = &[
    fk("customerId", Table::Customers),
    fk("billId", Table::Bills),
];

impl Table {
    /// Sync order: parents strictly before children.
    pub const SYNC_ORDER: [Self; 12] = [
        Self::Customers,
        Self::MenuItems,
        Self::Kots,
        Self::KotItems,
        Self::Bills,
        Self::BillItems,
        Self::Payments,
        Self::Receipts,
        Self::SplitPayments,
        Self::Expenses,
        Self::ExpenseSettlements,
        Self::CustomerAdvances,
    ];

    /// Table name, identical in both stores.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::MenuItems => "menu_items",
            Self::Kots => "kots",
            Self::KotItems => "kot_items",
            Self::Bills => "bills",
            Self::BillItems => "bill_items",
            Self::Payments => "payments",
            Self::Receipts => "receipts",
            Self::SplitPayments => "split_payments",
            Self::Expenses => "expenses",
            Self::ExpenseSettlements => "expense_settlements",
            Self::CustomerAdvances => "customer_advances",
        }
    }

    pub const fn columns(self) -> &'static [Column] {
        match self {
            Self::Customers => CUSTOMER_COLUMNS,
            Self::MenuItems => MENU_ITEM_COLUMNS,
            Self::Kots => KOT_COLUMNS,
            Self::KotItems => KOT_ITEM_COLUMNS,
            Self::Bills => BILL_COLUMNS,
            Self::BillItems => BILL_ITEM_COLUMNS,
            Self::Payments => PAYMENT_COLUMNS,
            Self::Receipts => RECEIPT_COLUMNS,
            Self::SplitPayments => SPLIT_PAYMENT_COLUMNS,
            Self::Expenses => EXPENSE_COLUMNS,
            Self::ExpenseSettlements => EXPENSE_SETTLEMENT_COLUMNS,
            Self::CustomerAdvances => CUSTOMER_ADVANCE_COLUMNS,
        }
    }

    pub const fn foreign_keys(self) -> &'static [ForeignKey] {
        match self {
            Self::Kots => KOT_FKS,
            Self::KotItems => KOT_ITEM_FKS,
            Self::Bills => BILL_FKS,
            Self::BillItems => BILL_ITEM_FKS,
            Self::Payments => PAYMENT_FKS,
            Self::Receipts => RECEIPT_FKS,
            Self::SplitPayments => SPLIT_PAYMENT_FKS,
            Self::ExpenseSettlements => EXPENSE_SETTLEMENT_FKS,
            Self::CustomerAdvances => CUSTOMER_ADVANCE_FKS,
            Self::Customers | Self::MenuItems | Self::Expenses => &[],
        }
    }

    /// Human-readable sequence column assigned by the cloud, never pushed.
    pub const fn sequence_column(self) -> Option<&'static Column> {
        let columns = self.columns();
        let local = match self {
            Self::Kots => "kotNumber",
            Self::Bills => "billNumber",
            Self::Receipts => "receiptNumber",
            Self::Expenses => "voucherNumber",
            _ => return None,
        };
        let mut index = 0;
        while index < columns.len() {
            if const_str_eq(columns[index].local, local) {
                return Some(&columns[index]);
            }
            index += 1;
        }
        None
    }

    pub const fn domain(self) -> SyncDomain {
        match self {
            Self::Customers | Self::CustomerAdvances => SyncDomain::Customers,
            Self::MenuItems | Self::Kots | Self::KotItems => SyncDomain::Orders,
            Self::Bills | Self::BillItems => SyncDomain::Bills,
            Self::Payments | Self::Receipts | Self::SplitPayments => SyncDomain::Payments,
            Self::Expenses | Self::ExpenseSettlements => SyncDomain::Expenses,
        }
    }

    /// Look up a column by its local name.
    pub fn local_column(self, local: &str) -> Option<&'static Column> {
        self.columns().iter().find(|column| column.local == local)
    }
}

const fn const_str_eq(left: &str, right: &str) -> bool {
    let left = left.as_bytes();
    let right = right.as_bytes();
    if left.len() != right.len() {
        return false;
    }
    let mut index = 0;
    while index < left.len() {
        if left[index] != right[index] {
            return false;
        }
        index += 1;
    }
    true
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::SYNC_ORDER
            .into_iter()
            .find(|table| table.name() == wanted)
            .ok_or_else(|| Error::UnknownTable(wanted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parse_known_and_unknown_tables() {
        assert_eq!("bills".parse::<Table>().unwrap(), Table::Bills);
        assert_eq!(" kot_items ".parse::<Table>().unwrap(), Table::KotItems);
        assert!(matches!(
            "legacy_orders".parse::<Table>(),
            Err(Error::UnknownTable(name)) if name == "legacy_orders"
        ));
    }

    #[test]
    fn parents_precede_children_in_sync_order() {
        let position = |table: Table| {
            Table::SYNC_ORDER
                .iter()
                .position(|candidate| *candidate == table)
                .unwrap()
        };

        for table in Table::SYNC_ORDER {
            for fk in table.foreign_keys() {
                assert!(
                    position(fk.parent) < position(table),
                    "{} must sync before {table}",
                    fk.parent
                );
            }
        }
    }

    #[test]
    fn column_names_are_unique_on_both_sides() {
        for table in Table::SYNC_ORDER {
            let local: HashSet<_> = table.columns().iter().map(|c| c.local).collect();
            let cloud: HashSet<_> = table.columns().iter().map(|c| c.cloud).collect();
            assert_eq!(local.len(), table.columns().len(), "{table}");
            assert_eq!(cloud.len(), table.columns().len(), "{table}");
        }
    }

    #[test]
    fn foreign_key_columns_are_declared() {
        for table in Table::SYNC_ORDER {
            for fk in table.foreign_keys() {
                assert!(table.local_column(fk.column).is_some(), "{table}.{}", fk.column);
            }
        }
    }

    #[test]
    fn sequence_columns_resolve() {
        assert_eq!(
            Table::Bills.sequence_column().map(|c| c.cloud),
            Some("bill_number")
        );
        assert_eq!(
            Table::Expenses.sequence_column().map(|c| c.local),
            Some("voucherNumber")
        );
        assert!(Table::Customers.sequence_column().is_none());
    }
}
