//! Ledger integrity errors.
//!
//! These abort a reconciliation pass. Per-file collaborator failures are
//! plain `anyhow` errors and never reach this type.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// More than one RagSource row exists for a path.
    #[error("ledger corruption: {count} source rows for {}", path.display())]
    DuplicateSource { path: PathBuf, count: usize },

    /// A file is desired by a collection but cannot be hashed.
    #[error("{} is claimed present but its content cannot be read", path.display())]
    MissingContent { path: PathBuf },

    #[error("cannot fingerprint {}: {source}", path.display())]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid action type in ledger: {0}")]
    InvalidActionType(String),

    #[error("invalid timestamp in ledger: {0}")]
    InvalidTimestamp(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
