//! # rag-ledger
//!
//! Keeps vector collections in sync with sets of files on disk, and records
//! every ingestion decision in an append-only SQLite ledger.
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────────┐
//! │ bot configs  │──▶│ reconcile  │◀──│    ledger    │
//! │ (dir, glob)  │   │  (intents) │   │ (last state) │
//! └──────────────┘   └─────┬──────┘   └──────▲───────┘
//!                          ▼                 │
//!                    ┌────────────┐          │
//!                    │  executor  │──────────┘
//!                    │ load+store │──▶ vector store
//!                    └────────────┘
//! ```
//!
//! Each pass enumerates the files every bot wants, reconstructs what the
//! ledger says each collection last received, and emits one of `new`,
//! `update` or `delete` per (file, collection) pair whose state differs.
//! Content changes are detected by SHA-256, never by mtime.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and bot definitions |
//! | [`models`] | Ledger rows and chunks |
//! | [`error`] | Ledger integrity errors |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Ledger schema bootstrap |
//! | [`ledger`] | Ledger store |
//! | [`fingerprint`] | Content hashing |
//! | [`connector_fs`] | Desired-state enumeration |
//! | [`reconcile`] | Intent planning |
//! | [`extract`] | Document text extraction |
//! | [`chunk`] | Paragraph chunking |
//! | [`loader`] | File → chunks |
//! | [`embedding`] | Embedding providers |
//! | [`vector`] | Vector-store backends |
//! | [`ingest`] | Executor and `sync`/`plan` commands |
//! | [`status`] | Ledger inspection commands |

pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod ingest;
pub mod ledger;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod reconcile;
pub mod status;
pub mod vector;
