//! SQLite connection management.
//!
//! Both the ledger and the SQLite vector store open their database through
//! [`connect`]. The pool holds a single connection: the ledger has exactly
//! one writer, and every statement acquires the connection only for its own
//! duration, so nothing is held across a slow chunking or embedding call.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open (creating if missing) the SQLite database at `db_path`.
///
/// Parent directories are created, WAL is enabled and foreign keys are
/// enforced.
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}
