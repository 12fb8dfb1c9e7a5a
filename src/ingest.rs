//! Ingestion executor.
//!
//! One pass: enumerate desired files, reconstruct known state from the
//! ledger, plan per-(file, collection) intents, then execute each file as a
//! unit:
//!
//! 1. `new`/`update` intents: load the file into chunks once. Zero chunks or
//!    a loader error skips the file for this pass with nothing recorded.
//!    For each collection: `update` first deletes the file's old chunks,
//!    then the new chunks are added and a collection action is recorded.
//! 2. `delete` intents: delete the file's chunks from each collection and
//!    record a `delete` collection action.
//!
//! The file's action row is written just before its first collection
//! action, so an action never exists without at least one collection
//! action, and collection actions always reference a committed action.
//!
//! Hashing, loader and vector-store failures are logged and counted; they
//! never stop the pass. Ledger errors abort it.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connector_fs::{desired_files, DesiredFiles};
use crate::error::LedgerError;
use crate::fingerprint::Fingerprinter;
use crate::ledger::LedgerStore;
use crate::loader::{DocumentLoader, FileLoader};
use crate::models::{Action, ActionType, Chunk};
use crate::reconcile::{plan_actions, FilePlan};
use crate::vector::{open_vector_store, VectorStore};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Distinct paths either desired now or known to the ledger.
    pub files_scanned: usize,
    /// Paths with at least one intent.
    pub files_pending: usize,
    pub actions_recorded: usize,
    pub new: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Files that loaded to zero chunks.
    pub skipped_empty: usize,
    /// Files abandoned after a hashing, loader or vector-store error.
    pub failed: usize,
}

impl SyncReport {
    fn count(&mut self, action: ActionType) {
        match action {
            ActionType::New => self.new += 1,
            ActionType::Update => self.updated += 1,
            ActionType::Delete => self.deleted += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Done,
    SkippedEmpty,
    Failed,
}

/// The executor, wired to a ledger and its two collaborators.
pub struct Ingestor {
    ledger: LedgerStore,
    loader: Arc<dyn DocumentLoader>,
    vectors: Arc<dyn VectorStore>,
}

impl Ingestor {
    pub fn new(
        ledger: LedgerStore,
        loader: Arc<dyn DocumentLoader>,
        vectors: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            ledger,
            loader,
            vectors,
        }
    }

    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    /// Plan without executing. Returns the number of distinct paths
    /// considered and the files with pending intents.
    pub async fn plan(
        &self,
        desired: &DesiredFiles,
        fingerprints: &mut Fingerprinter,
    ) -> Result<(usize, Vec<FilePlan>), LedgerError> {
        let known = self.ledger.latest_per_source_collection().await?;
        let states = plan_actions(desired, &known);
        let pending = states.pending(fingerprints)?;
        Ok((states.len(), pending))
    }

    /// Run one full reconciliation pass against `desired`.
    pub async fn process_files(&self, desired: &DesiredFiles) -> Result<SyncReport, LedgerError> {
        let mut fingerprints = Fingerprinter::new();
        let (scanned, plans) = self.plan(desired, &mut fingerprints).await?;

        let mut report = SyncReport {
            files_scanned: scanned,
            files_pending: plans.len(),
            ..SyncReport::default()
        };

        for plan in &plans {
            match self.process_file(plan, &mut fingerprints, &mut report).await? {
                FileOutcome::Done => {}
                FileOutcome::SkippedEmpty => report.skipped_empty += 1,
                FileOutcome::Failed => report.failed += 1,
            }
        }

        info!(
            scanned = report.files_scanned,
            pending = report.files_pending,
            actions = report.actions_recorded,
            failed = report.failed,
            "reconciliation pass complete"
        );
        Ok(report)
    }

    async fn process_file(
        &self,
        plan: &FilePlan,
        fingerprints: &mut Fingerprinter,
        report: &mut SyncReport,
    ) -> Result<FileOutcome, LedgerError> {
        let path = plan.path.as_path();
        let source = path.to_string_lossy();
        let sha256 = match fingerprints.fingerprint(path) {
            Ok(digest) => digest.to_string(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "hashing failed, retrying next pass");
                return Ok(FileOutcome::Failed);
            }
        };

        let mut chunks: Vec<Chunk> = Vec::new();
        if !plan.uploads.is_empty() {
            chunks = match self.loader.load_into_chunks(path).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!(path = %path.display(), error = %format!("{e:#}"), "load failed, retrying next pass");
                    return Ok(FileOutcome::Failed);
                }
            };
            if chunks.is_empty() {
                info!(path = %path.display(), "document produced no chunks, skipping");
                return Ok(FileOutcome::SkippedEmpty);
            }
        }

        let mut action: Option<Action> = None;

        for (collection, kind) in &plan.uploads {
            if let Err(e) = self.upload(collection, *kind, &source, &chunks).await {
                warn!(
                    path = %path.display(),
                    collection = %collection,
                    error = %format!("{e:#}"),
                    "vector store update failed, abandoning file for this pass"
                );
                return Ok(FileOutcome::Failed);
            }
            let action_id = self
                .ensure_action(&mut action, path, chunks.len(), &sha256, report)
                .await?;
            self.ledger
                .record_collection_action(action_id, collection, *kind, Utc::now())
                .await?;
            report.count(*kind);
        }

        for collection in &plan.deletes {
            match self.vectors.delete_by_source(collection, &source).await {
                Ok(removed) => {
                    debug!(path = %path.display(), collection = %collection, removed, "removed chunks")
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        collection = %collection,
                        error = %format!("{e:#}"),
                        "vector store delete failed, abandoning file for this pass"
                    );
                    return Ok(FileOutcome::Failed);
                }
            }
            let action_id = self
                .ensure_action(&mut action, path, chunks.len(), &sha256, report)
                .await?;
            self.ledger
                .record_collection_action(action_id, collection, ActionType::Delete, Utc::now())
                .await?;
            report.count(ActionType::Delete);
        }

        Ok(FileOutcome::Done)
    }

    async fn upload(
        &self,
        collection: &str,
        kind: ActionType,
        source: &str,
        chunks: &[Chunk],
    ) -> Result<()> {
        if kind == ActionType::Update {
            self.vectors.delete_by_source(collection, source).await?;
        }
        self.vectors.add_documents(collection, chunks).await
    }

    /// The file's action for this pass, recording it on first use.
    async fn ensure_action(
        &self,
        action: &mut Option<Action>,
        path: &Path,
        n_chunks: usize,
        sha256: &str,
        report: &mut SyncReport,
    ) -> Result<i64, LedgerError> {
        if let Some(a) = action {
            return Ok(a.action_id);
        }
        let source = self.ledger.upsert_source(path).await?;
        let recorded = self
            .ledger
            .record_action(source.source_id, n_chunks as i64, None, sha256, Utc::now())
            .await?;
        report.actions_recorded += 1;
        let id = recorded.action_id;
        *action = Some(recorded);
        Ok(id)
    }
}

async fn open_ingestor(config: &Config) -> Result<Ingestor> {
    let ledger = LedgerStore::open(&config.db.path).await?;
    let loader: Arc<dyn DocumentLoader> = Arc::new(FileLoader::new(config.chunking.max_tokens));
    let vectors = open_vector_store(config).await?;
    Ok(Ingestor::new(ledger, loader, vectors))
}

/// `ragl sync`: one reconciliation and execution pass.
pub async fn run_sync(config: &Config) -> Result<()> {
    let desired = desired_files(&config.bots)?;
    let ingestor = open_ingestor(config).await?;
    let report = ingestor.process_files(&desired).await?;

    println!("sync");
    println!("  files scanned: {}", report.files_scanned);
    println!("  files pending: {}", report.files_pending);
    println!("  actions recorded: {}", report.actions_recorded);
    println!("  new: {}", report.new);
    println!("  updated: {}", report.updated);
    println!("  deleted: {}", report.deleted);
    println!("  skipped (no chunks): {}", report.skipped_empty);
    println!("  failed: {}", report.failed);
    println!("ok");

    ingestor.ledger().close().await;
    Ok(())
}

/// `ragl plan`: print pending intents without executing them.
pub async fn run_plan(config: &Config) -> Result<()> {
    let desired = desired_files(&config.bots)?;
    let ledger = LedgerStore::open(&config.db.path).await?;
    let known = ledger.latest_per_source_collection().await?;
    let states = plan_actions(&desired, &known);
    let plans = states.pending(&mut Fingerprinter::new())?;

    for plan in &plans {
        for (collection, action) in plan.intents() {
            println!("{} {} {}", action, collection, plan.path.display());
        }
    }
    if plans.is_empty() {
        println!("nothing to do");
    }

    ledger.close().await;
    Ok(())
}
