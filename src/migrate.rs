//! Ledger schema bootstrap.
//!
//! The ledger never assumes a pre-provisioned schema: [`ensure_schema`]
//! checks for the three tables and creates whatever is missing. Every
//! statement is idempotent, so running it repeatedly is safe.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Ledger tables, in foreign-key order.
pub const LEDGER_TABLES: [&str; 3] = ["RagSource", "RagAction", "RagActionCollection"];

/// `true` when all ledger tables are present.
pub async fn tables_exist(pool: &SqlitePool) -> Result<bool, sqlx::Error> {
    let found: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN (?, ?, ?)",
    )
    .bind(LEDGER_TABLES[0])
    .bind(LEDGER_TABLES[1])
    .bind(LEDGER_TABLES[2])
    .fetch_one(pool)
    .await?;

    Ok(found == LEDGER_TABLES.len() as i64)
}

pub async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS RagSource (
            source_id INTEGER PRIMARY KEY,
            absolute_path TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS RagAction (
            action_id INTEGER PRIMARY KEY,
            source_id INTEGER NOT NULL REFERENCES RagSource(source_id),
            timestamp TEXT NOT NULL,
            n_chunks INTEGER NOT NULL CHECK (n_chunks >= 0),
            error TEXT NULL,
            sha256 TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS RagActionCollection (
            action_id INTEGER NOT NULL REFERENCES RagAction(action_id),
            action TEXT NOT NULL CHECK (action IN ('new', 'update', 'delete')),
            collection TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_rag_source_path ON RagSource(absolute_path)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rag_action_latest ON RagAction(source_id, timestamp DESC, action_id DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rag_action_collection ON RagActionCollection(action_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Check-then-create, run on first use of a ledger.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    if !tables_exist(pool).await? {
        create_tables(pool).await?;
    }
    Ok(())
}

/// `ragl init`: create the ledger database and its schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    ensure_schema(&pool).await?;
    pool.close().await;
    Ok(())
}
