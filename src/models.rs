//! Core data models used throughout the ledger.
//!
//! The three ledger entities ([`Source`], [`Action`], [`CollectionAction`])
//! are plain structs with hand-written row mappings in [`crate::ledger`].
//! [`Chunk`] is the unit exchanged with the loader and vector-store
//! collaborators.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::LedgerError;

/// One row per distinct absolute file path ever observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub source_id: i64,
    pub absolute_path: PathBuf,
}

/// One ingestion attempt against a [`Source`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub action_id: i64,
    pub source_id: i64,
    pub timestamp: DateTime<Utc>,
    pub n_chunks: i64,
    pub error: Option<String>,
    /// Content hash at the time of the attempt; empty when the file was absent.
    pub sha256: String,
}

/// What happened to one collection as part of an [`Action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionAction {
    pub action_id: i64,
    pub action: ActionType,
    pub collection: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-collection transition recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionType {
    New,
    Update,
    Delete,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::New => "new",
            ActionType::Update => "update",
            ActionType::Delete => "delete",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ActionType::New),
            "update" => Ok(ActionType::Update),
            "delete" => Ok(ActionType::Delete),
            other => Err(LedgerError::InvalidActionType(other.to_string())),
        }
    }
}

/// The current action of a source together with everything it did.
///
/// Returned by [`LedgerStore::latest_active_per_source`](crate::ledger::LedgerStore::latest_active_per_source).
#[derive(Debug, Clone)]
pub struct LatestAction {
    pub source: Source,
    pub action: Action,
    pub collections: Vec<CollectionAction>,
}

/// Last known state of one (source, collection) pair.
#[derive(Debug, Clone)]
pub struct TrackedCollection {
    pub source: Source,
    pub collection: String,
    pub action: ActionType,
    pub action_id: i64,
    /// Hash recorded on the owning action.
    pub sha256: String,
}

/// A chunk of a source document, as produced by a loader.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    /// Absolute path of the originating file; the vector-store delete filter.
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// Encode a ledger timestamp.
///
/// Fixed-width RFC 3339 with microseconds and `Z`, so that lexical order in
/// SQLite matches chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a ledger timestamp written by [`format_timestamp`].
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| LedgerError::InvalidTimestamp(raw.to_string()))
}
