//! Schema creation and migration.
//!
//! `init_schema` is idempotent (CREATE TABLE IF NOT EXISTS + INSERT OR
//! IGNORE seeds). `migrate` upgrades databases created by older
//! releases by probing `PRAGMA table_info` and adding the columns that
//! are missing.

use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::Result;

const CREATE_INDIVIDUAL_CLIENTS: &str = r#"
CREATE TABLE IF NOT EXISTS individual_clients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    surname TEXT NOT NULL,
    given_name TEXT NOT NULL,
    sex TEXT CHECK(sex IN ('M', 'F', 'Other')),
    identity_number TEXT NOT NULL UNIQUE,
    phone TEXT NOT NULL,
    email TEXT,
    address TEXT,
    birth_date TEXT,
    created_at TEXT NOT NULL
)
"#;

const CREATE_CORPORATE_CLIENTS: &str = r#"
CREATE TABLE IF NOT EXISTS corporate_clients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    legal_name TEXT NOT NULL,
    tax_id TEXT NOT NULL UNIQUE,
    registration_number TEXT,
    legal_form TEXT,
    phone TEXT NOT NULL,
    email TEXT,
    address TEXT,
    rep_surname TEXT,
    rep_given_name TEXT,
    rep_identity_number TEXT,
    rep_capacity TEXT,
    created_at TEXT NOT NULL
)
"#;

const CREATE_CONTRACTS: &str = r#"
CREATE TABLE IF NOT EXISTS contracts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contract_number TEXT NOT NULL UNIQUE,
    client_id INTEGER NOT NULL,
    client_kind TEXT NOT NULL CHECK(client_kind IN ('individual', 'corporate')),
    service_type TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL,
    duration_months INTEGER NOT NULL DEFAULT 12,
    monthly_amount REAL NOT NULL,
    opening_fee REAL NOT NULL DEFAULT 0,
    deposit REAL NOT NULL DEFAULT 0,
    included_services TEXT,
    conditions TEXT,
    status TEXT NOT NULL DEFAULT 'active'
        CHECK(status IN ('active', 'pending', 'suspended', 'terminated')),
    created_at TEXT NOT NULL
)
"#;

const CREATE_INVOICES: &str = r#"
CREATE TABLE IF NOT EXISTS invoices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    invoice_number TEXT NOT NULL UNIQUE,
    contract_id INTEGER NOT NULL,
    client_id INTEGER NOT NULL,
    client_kind TEXT NOT NULL CHECK(client_kind IN ('individual', 'corporate')),
    invoice_date TEXT NOT NULL,
    due_date TEXT NOT NULL,
    period_start TEXT,
    period_end TEXT,
    pre_tax_amount REAL NOT NULL,
    tax_rate REAL NOT NULL DEFAULT 20.0,
    tax_amount REAL NOT NULL,
    total_amount REAL NOT NULL,
    description TEXT,
    payment_method TEXT NOT NULL DEFAULT 'transfer',
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK(status IN ('pending', 'paid', 'overdue', 'cancelled')),
    payment_date TEXT,
    created_at TEXT NOT NULL
)
"#;

const CREATE_PAYMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS payments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contract_id INTEGER NOT NULL REFERENCES contracts(id),
    amount REAL NOT NULL,
    payment_date TEXT NOT NULL,
    method TEXT NOT NULL DEFAULT 'cash',
    reference TEXT,
    created_at TEXT NOT NULL
)
"#;

const CREATE_CHANGE_HISTORY: &str = r#"
CREATE TABLE IF NOT EXISTS change_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id INTEGER NOT NULL,
    client_kind TEXT NOT NULL,
    field TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    actor TEXT NOT NULL DEFAULT 'system',
    changed_at TEXT NOT NULL
)
"#;

const CREATE_SERVICE_TYPES: &str = r#"
CREATE TABLE IF NOT EXISTS service_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL UNIQUE,
    description TEXT,
    base_rate REAL NOT NULL DEFAULT 0
)
"#;

/// Reference service offerings seeded on first run.
const SERVICE_TYPE_SEEDS: &[(&str, &str, f64)] = &[
    ("Standard", "Registered office address", 250.0),
    ("Premium", "Address with mail handling and forwarding", 400.0),
    ("Professional", "Address, mail handling and meeting room access", 600.0),
];

/// Create all tables and seed the service-type catalogue. Idempotent.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for ddl in [
        CREATE_INDIVIDUAL_CLIENTS,
        CREATE_CORPORATE_CLIENTS,
        CREATE_CONTRACTS,
        CREATE_INVOICES,
        CREATE_PAYMENTS,
        CREATE_CHANGE_HISTORY,
        CREATE_SERVICE_TYPES,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    for (label, description, base_rate) in SERVICE_TYPE_SEEDS {
        sqlx::query(
            "INSERT OR IGNORE INTO service_types (label, description, base_rate)
             VALUES (?, ?, ?)",
        )
        .bind(label)
        .bind(description)
        .bind(base_rate)
        .execute(pool)
        .await?;
    }

    debug!("Schema initialized");
    Ok(())
}

async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    // Table names come from the fixed list below, never from input.
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .any(|row| row.get::<String, _>("name") == column))
}

/// Columns added after the first release, with the DDL that adds them.
const MIGRATIONS: &[(&str, &str, &str)] = &[
    (
        "contracts",
        "opening_fee",
        "ALTER TABLE contracts ADD COLUMN opening_fee REAL NOT NULL DEFAULT 0",
    ),
    (
        "contracts",
        "deposit",
        "ALTER TABLE contracts ADD COLUMN deposit REAL NOT NULL DEFAULT 0",
    ),
    (
        "contracts",
        "included_services",
        "ALTER TABLE contracts ADD COLUMN included_services TEXT",
    ),
    (
        "contracts",
        "conditions",
        "ALTER TABLE contracts ADD COLUMN conditions TEXT",
    ),
    (
        "invoices",
        "client_kind",
        "ALTER TABLE invoices ADD COLUMN client_kind TEXT NOT NULL DEFAULT 'individual'",
    ),
    (
        "invoices",
        "period_start",
        "ALTER TABLE invoices ADD COLUMN period_start TEXT",
    ),
    (
        "invoices",
        "period_end",
        "ALTER TABLE invoices ADD COLUMN period_end TEXT",
    ),
    (
        "invoices",
        "payment_date",
        "ALTER TABLE invoices ADD COLUMN payment_date TEXT",
    ),
    (
        "corporate_clients",
        "rep_capacity",
        "ALTER TABLE corporate_clients ADD COLUMN rep_capacity TEXT",
    ),
];

/// Upgrade a database created by an older release. Safe to run on a
/// fresh schema (every probe comes back positive and nothing happens).
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    let mut applied = 0u32;
    for (table, column, ddl) in MIGRATIONS {
        if !column_exists(pool, table, column).await? {
            sqlx::query(ddl).execute(pool).await?;
            info!(table, column, "Added missing column");
            applied += 1;
        }
    }
    if applied > 0 {
        info!(applied, "Schema migration complete");
    }
    Ok(())
}

/// Counts of rows removed by [`purge_orphans`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub contracts: u64,
    pub payments: u64,
    pub invoices: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.contracts + self.payments + self.invoices
    }
}

/// Delete rows whose parent no longer resolves: contracts pointing at a
/// missing client, payments pointing at a missing contract, invoices
/// pointing at a missing client.
pub async fn purge_orphans(pool: &SqlitePool) -> Result<PurgeReport> {
    let mut tx = pool.begin().await?;

    let contracts = sqlx::query(
        "DELETE FROM contracts WHERE
            (client_kind = 'individual'
                AND client_id NOT IN (SELECT id FROM individual_clients))
         OR (client_kind = 'corporate'
                AND client_id NOT IN (SELECT id FROM corporate_clients))",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let payments = sqlx::query(
        "DELETE FROM payments WHERE contract_id NOT IN (SELECT id FROM contracts)",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let invoices = sqlx::query(
        "DELETE FROM invoices WHERE
            (client_kind = 'individual'
                AND client_id NOT IN (SELECT id FROM individual_clients))
         OR (client_kind = 'corporate'
                AND client_id NOT IN (SELECT id FROM corporate_clients))",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    let report = PurgeReport {
        contracts,
        payments,
        invoices,
    };
    if report.total() > 0 {
        info!(
            contracts = report.contracts,
            payments = report.payments,
            invoices = report.invoices,
            "Purged orphaned rows"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let pool = memory_pool().await;
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM service_types")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 3, "seeds must not duplicate on re-init");
    }

    #[tokio::test]
    async fn test_migrate_adds_missing_columns() {
        let pool = memory_pool().await;
        // Old-release invoices table without client_kind or payment_date.
        sqlx::query(
            "CREATE TABLE invoices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                invoice_number TEXT NOT NULL UNIQUE,
                contract_id INTEGER NOT NULL,
                client_id INTEGER NOT NULL,
                invoice_date TEXT NOT NULL,
                due_date TEXT NOT NULL,
                pre_tax_amount REAL NOT NULL,
                tax_rate REAL NOT NULL DEFAULT 20.0,
                tax_amount REAL NOT NULL,
                total_amount REAL NOT NULL,
                description TEXT,
                payment_method TEXT NOT NULL DEFAULT 'transfer',
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        init_schema(&pool).await.unwrap();

        assert!(!column_exists(&pool, "invoices", "client_kind").await.unwrap());
        migrate(&pool).await.unwrap();
        assert!(column_exists(&pool, "invoices", "client_kind").await.unwrap());
        assert!(column_exists(&pool, "invoices", "payment_date").await.unwrap());

        // Second run is a no-op.
        migrate(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_orphans_reports_counts() {
        let pool = memory_pool().await;
        init_schema(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO contracts (contract_number, client_id, client_kind,
                service_type, start_date, end_date, duration_months,
                monthly_amount, created_at)
             VALUES ('DOM-202501-0001', 99, 'individual', 'Standard',
                '2025-01-01', '2025-12-27', 12, 300.0, '2025-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO payments (contract_id, amount, payment_date, method, created_at)
             VALUES (1, 300.0, '2025-02-01', 'cash', '2025-02-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let report = purge_orphans(&pool).await.unwrap();
        assert_eq!(report.contracts, 1);
        assert_eq!(report.payments, 1);
        assert_eq!(report.invoices, 0);
        assert_eq!(report.total(), 2);

        let report = purge_orphans(&pool).await.unwrap();
        assert_eq!(report.total(), 0);
    }
}
