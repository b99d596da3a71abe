//! Database migrations

use crate::error::{Error, Result};
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;
    if version > CURRENT_VERSION {
        return Err(Error::Database(format!(
            "schema version {version} is newer than this build supports ({CURRENT_VERSION})"
        )));
    }

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Execute statements atomically, rolling back on the first failure
async fn run_statements(conn: &Connection, statements: &[&str]) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: business tables
///
/// Every table carries `id`, `createdAt`, `updatedAt`, `deletedAt` and
/// `shopId`. Timestamps are TEXT in either ISO-8601 or `YYYY-MM-DD HH:MM:SS`
/// form. Foreign keys never cascade: a tombstoned parent keeps its children.
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        "CREATE TABLE IF NOT EXISTS customers (
            id TEXT PRIMARY KEY,
            name TEXT,
            phone TEXT,
            email TEXT,
            creditLimit REAL,
            notes TEXT,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            deletedAt TEXT,
            shopId TEXT NOT NULL DEFAULT 'shop_1'
        )",
        "CREATE TABLE IF NOT EXISTS menu_items (
            id TEXT PRIMARY KEY,
            name TEXT,
            category TEXT,
            price REAL,
            isAvailable INTEGER DEFAULT 1,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            deletedAt TEXT,
            shopId TEXT NOT NULL DEFAULT 'shop_1'
        )",
        "CREATE TABLE IF NOT EXISTS kots (
            id TEXT PRIMARY KEY,
            kotNumber INTEGER,
            customerId TEXT REFERENCES customers(id),
            tableLabel TEXT,
            status TEXT,
            notes TEXT,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            deletedAt TEXT,
            shopId TEXT NOT NULL DEFAULT 'shop_1'
        )",
        "CREATE TABLE IF NOT EXISTS kot_items (
            id TEXT PRIMARY KEY,
            kotId TEXT REFERENCES kots(id),
            menuItemId TEXT REFERENCES menu_items(id),
            itemName TEXT,
            quantity INTEGER,
            unitPrice REAL,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            deletedAt TEXT,
            shopId TEXT NOT NULL DEFAULT 'shop_1'
        )",
        "CREATE TABLE IF NOT EXISTS bills (
            id TEXT PRIMARY KEY,
            billNumber INTEGER,
            customerId TEXT REFERENCES customers(id),
            subtotal REAL,
            discount REAL,
            tax REAL,
            total REAL,
            status TEXT,
            paymentMode TEXT,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            deletedAt TEXT,
            shopId TEXT NOT NULL DEFAULT 'shop_1'
        )",
        "CREATE TABLE IF NOT EXISTS bill_items (
            id TEXT PRIMARY KEY,
            billId TEXT REFERENCES bills(id),
            menuItemId TEXT REFERENCES menu_items(id),
            itemName TEXT,
            quantity INTEGER,
            unitPrice REAL,
            lineTotal REAL,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            deletedAt TEXT,
            shopId TEXT NOT NULL DEFAULT 'shop_1'
        )",
        "CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            billId TEXT REFERENCES bills(id),
            customerId TEXT REFERENCES customers(id),
            amount REAL,
            mode TEXT,
            paidAt TEXT,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            deletedAt TEXT,
            shopId TEXT NOT NULL DEFAULT 'shop_1'
        )",
        "CREATE TABLE IF NOT EXISTS receipts (
            id TEXT PRIMARY KEY,
            receiptNumber INTEGER,
            customerId TEXT REFERENCES customers(id),
            amount REAL,
            mode TEXT,
            notes TEXT,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            deletedAt TEXT,
            shopId TEXT NOT NULL DEFAULT 'shop_1'
        )",
        "CREATE TABLE IF NOT EXISTS split_payments (
            id TEXT PRIMARY KEY,
            receiptId TEXT REFERENCES receipts(id),
            mode TEXT,
            amount REAL,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            deletedAt TEXT,
            shopId TEXT NOT NULL DEFAULT 'shop_1'
        )",
        "CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            voucherNumber INTEGER,
            category TEXT,
            description TEXT,
            amount REAL,
            expenseDate TEXT,
            paidBy TEXT,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            deletedAt TEXT,
            shopId TEXT NOT NULL DEFAULT 'shop_1'
        )",
        "CREATE TABLE IF NOT EXISTS expense_settlements (
            id TEXT PRIMARY KEY,
            expenseId TEXT REFERENCES expenses(id),
            amount REAL,
            mode TEXT,
            settledAt TEXT,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            deletedAt TEXT,
            shopId TEXT NOT NULL DEFAULT 'shop_1'
        )",
        "CREATE TABLE IF NOT EXISTS customer_advances (
            id TEXT PRIMARY KEY,
            customerId TEXT REFERENCES customers(id),
            billId TEXT REFERENCES bills(id),
            entryType TEXT,
            amount REAL,
            notes TEXT,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            deletedAt TEXT,
            shopId TEXT NOT NULL DEFAULT 'shop_1'
        )",
        "CREATE INDEX IF NOT EXISTS idx_kots_customer ON kots(customerId)",
        "CREATE INDEX IF NOT EXISTS idx_kot_items_kot ON kot_items(kotId)",
        "CREATE INDEX IF NOT EXISTS idx_bills_customer ON bills(customerId)",
        "CREATE INDEX IF NOT EXISTS idx_bill_items_bill ON bill_items(billId)",
        "CREATE INDEX IF NOT EXISTS idx_payments_bill ON payments(billId)",
        "CREATE INDEX IF NOT EXISTS idx_split_payments_receipt ON split_payments(receiptId)",
        "CREATE INDEX IF NOT EXISTS idx_expense_settlements_expense ON expense_settlements(expenseId)",
        "CREATE INDEX IF NOT EXISTS idx_customer_advances_customer ON customer_advances(customerId)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    run_statements(conn, &statements).await?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: sync checkpoints and LWW conflict logging
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let mut statements = vec![
        "CREATE TABLE IF NOT EXISTS sync_checkpoints (
            tableName TEXT PRIMARY KEY,
            lastPushAt TEXT,
            lastPullAt TEXT
        )",
        "CREATE TABLE IF NOT EXISTS sync_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tableName TEXT NOT NULL,
            rowId TEXT NOT NULL,
            direction TEXT NOT NULL,
            localLatestAt INTEGER NOT NULL,
            incomingLatestAt INTEGER NOT NULL,
            resolvedAt INTEGER NOT NULL,
            strategy TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_row ON sync_conflicts(tableName, rowId)",
        "CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolvedAt DESC)",
    ];

    // Change readers filter on these two columns for every table.
    let indexes = crate::models::Table::SYNC_ORDER
        .iter()
        .flat_map(|table| {
            [
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{0}_updated ON {0}(updatedAt)",
                    table.name()
                ),
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{0}_deleted ON {0}(deletedAt)",
                    table.name()
                ),
            ]
        })
        .collect::<Vec<_>>();
    statements.extend(indexes.iter().map(String::as_str));
    statements.push("INSERT INTO schema_version (version) VALUES (2)");

    run_statements(conn, &statements).await?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Table;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = ?
                )",
                [name],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_newer_schema_is_refused() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (99)", ())
            .await
            .unwrap();

        let error = run(&conn).await.unwrap_err();
        assert!(matches!(error, Error::Database(ref message) if message.contains("99")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_every_synced_table_is_created() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in Table::SYNC_ORDER {
            assert!(table_exists(&conn, table.name()).await, "{table}");
        }
        assert!(table_exists(&conn, "sync_checkpoints").await);
        assert!(table_exists(&conn, "sync_conflicts").await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_schema_matches_column_catalogue() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in Table::SYNC_ORDER {
            let mut rows = conn
                .query(&format!("PRAGMA table_info({})", table.name()), ())
                .await
                .unwrap();
            let mut names = Vec::new();
            while let Some(row) = rows.next().await.unwrap() {
                names.push(row.get::<String>(1).unwrap());
            }

            for column in table.columns() {
                assert!(
                    names.iter().any(|name| name == column.local),
                    "{table} is missing {}",
                    column.local
                );
            }
            assert_eq!(names.len(), table.columns().len(), "{table}");
        }
    }
}
