//! Ledger Store: the append-mostly audit trail of ingestion decisions.
//!
//! Three tables, written only through [`LedgerStore`]:
//!
//! | Table | Row |
//! |-------|-----|
//! | `RagSource` | one per absolute path ever seen ([`Source`]) |
//! | `RagAction` | one per ingestion attempt ([`Action`]) |
//! | `RagActionCollection` | one per (action, collection) ([`CollectionAction`]) |
//!
//! There is no mutable "current state" table. The current state of a source
//! is its action with the greatest `(timestamp, action_id)`, so an
//! interrupted run always leaves a well-defined latest action behind.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::db;
use crate::error::LedgerError;
use crate::migrate;
use crate::models::{
    format_timestamp, parse_timestamp, Action, ActionType, CollectionAction, LatestAction,
    Source, TrackedCollection,
};

type LedgerResult<T> = Result<T, LedgerError>;

/// Row counts, for `ragl status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub sources: i64,
    pub actions: i64,
    pub collection_actions: i64,
}

/// Handle on the ledger database.
#[derive(Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    /// Open the ledger at `path`, bootstrapping the schema if needed.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let pool = db::connect(path).await?;
        Self::from_pool(pool).await.map_err(Into::into)
    }

    pub async fn from_pool(pool: SqlitePool) -> LedgerResult<Self> {
        migrate::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ============================================
    // SOURCES
    // ============================================

    /// Every source row recorded for `path`.
    pub async fn find_sources(&self, path: &Path) -> LedgerResult<Vec<Source>> {
        let rows = sqlx::query(
            "SELECT source_id, absolute_path FROM RagSource WHERE absolute_path = ? ORDER BY source_id",
        )
        .bind(path_str(path))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(source_from_row).collect()
    }

    /// Return the source for `path`, inserting it on first sight.
    ///
    /// More than one existing row means the ledger is corrupt and fails with
    /// [`LedgerError::DuplicateSource`].
    pub async fn upsert_source(&self, path: &Path) -> LedgerResult<Source> {
        let mut existing = self.find_sources(path).await?;
        match existing.len() {
            0 => {
                let result = sqlx::query("INSERT INTO RagSource (absolute_path) VALUES (?)")
                    .bind(path_str(path))
                    .execute(&self.pool)
                    .await?;
                let source = Source {
                    source_id: result.last_insert_rowid(),
                    absolute_path: path.to_path_buf(),
                };
                debug!(source_id = source.source_id, path = %path.display(), "stored source");
                Ok(source)
            }
            1 => Ok(existing.remove(0)),
            count => Err(LedgerError::DuplicateSource {
                path: path.to_path_buf(),
                count,
            }),
        }
    }

    /// Write a source with a pre-assigned key, overwriting any row with that key.
    pub async fn put_source(&self, source: &Source) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO RagSource (source_id, absolute_path) VALUES (?, ?)
            ON CONFLICT(source_id) DO UPDATE SET absolute_path = excluded.absolute_path
            "#,
        )
        .bind(source.source_id)
        .bind(path_str(&source.absolute_path))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ============================================
    // ACTIONS
    // ============================================

    /// Insert a new action row. Always allocates a fresh `action_id`.
    pub async fn record_action(
        &self,
        source_id: i64,
        n_chunks: i64,
        error: Option<&str>,
        sha256: &str,
        timestamp: DateTime<Utc>,
    ) -> LedgerResult<Action> {
        let result = sqlx::query(
            "INSERT INTO RagAction (source_id, timestamp, n_chunks, error, sha256) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(source_id)
        .bind(format_timestamp(&timestamp))
        .bind(n_chunks)
        .bind(error)
        .bind(sha256)
        .execute(&self.pool)
        .await?;

        let action = Action {
            action_id: result.last_insert_rowid(),
            source_id,
            timestamp,
            n_chunks,
            error: error.map(str::to_string),
            sha256: sha256.to_string(),
        };
        debug!(
            action_id = action.action_id,
            source_id,
            n_chunks,
            sha256 = %action.sha256,
            "stored action"
        );
        Ok(action)
    }

    /// Write an action with a pre-assigned key, overwriting any row with that key.
    pub async fn put_action(&self, action: &Action) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO RagAction (action_id, source_id, timestamp, n_chunks, error, sha256)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(action_id) DO UPDATE SET
                source_id = excluded.source_id,
                timestamp = excluded.timestamp,
                n_chunks = excluded.n_chunks,
                error = excluded.error,
                sha256 = excluded.sha256
            "#,
        )
        .bind(action.action_id)
        .bind(action.source_id)
        .bind(format_timestamp(&action.timestamp))
        .bind(action.n_chunks)
        .bind(&action.error)
        .bind(&action.sha256)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_collection_action(
        &self,
        action_id: i64,
        collection: &str,
        action_type: ActionType,
        timestamp: DateTime<Utc>,
    ) -> LedgerResult<CollectionAction> {
        sqlx::query(
            "INSERT INTO RagActionCollection (action_id, action, collection, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(action_id)
        .bind(action_type.as_str())
        .bind(collection)
        .bind(format_timestamp(&timestamp))
        .execute(&self.pool)
        .await?;

        debug!(action_id, collection, action = %action_type, "stored collection action");
        Ok(CollectionAction {
            action_id,
            action: action_type,
            collection: collection.to_string(),
            timestamp,
        })
    }

    // ============================================
    // RECONSTRUCTION
    // ============================================

    /// The current action of every source that has at least one action.
    ///
    /// Per source, the action with the greatest `timestamp` wins, ties going
    /// to the greater `action_id`. Its collection actions are attached.
    /// Results are ordered by path.
    pub async fn latest_active_per_source(&self) -> LedgerResult<Vec<LatestAction>> {
        let rows = sqlx::query(
            r#"
            SELECT s.source_id, s.absolute_path,
                   a.action_id, a.timestamp, a.n_chunks, a.error, a.sha256
            FROM RagAction a
            JOIN RagSource s ON s.source_id = a.source_id
            WHERE a.action_id = (
                SELECT b.action_id FROM RagAction b
                WHERE b.source_id = a.source_id
                ORDER BY b.timestamp DESC, b.action_id DESC
                LIMIT 1
            )
            ORDER BY s.absolute_path, s.source_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut latest = Vec::with_capacity(rows.len());
        for row in &rows {
            let source = source_from_row(row)?;
            let action = action_from_row(row, source.source_id)?;
            latest.push(LatestAction {
                source,
                action,
                collections: Vec::new(),
            });
        }

        let collection_rows = sqlx::query(
            r#"
            SELECT c.action_id, c.action, c.collection, c.timestamp
            FROM RagActionCollection c
            WHERE c.action_id IN (
                SELECT a.action_id FROM RagAction a
                WHERE a.action_id = (
                    SELECT b.action_id FROM RagAction b
                    WHERE b.source_id = a.source_id
                    ORDER BY b.timestamp DESC, b.action_id DESC
                    LIMIT 1
                )
            )
            ORDER BY c.action_id, c.collection
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_action: HashMap<i64, Vec<CollectionAction>> = HashMap::new();
        for row in &collection_rows {
            let ca = collection_action_from_row(row)?;
            by_action.entry(ca.action_id).or_default().push(ca);
        }
        for entry in &mut latest {
            entry.collections = by_action.remove(&entry.action.action_id).unwrap_or_default();
        }

        Ok(latest)
    }

    /// Last known state of every (source, collection) pair.
    ///
    /// Same max-`(timestamp, action_id)` rule as
    /// [`latest_active_per_source`](Self::latest_active_per_source), applied
    /// per pair, so a collection that was up to date while a sibling
    /// collection of the same file changed is not forgotten.
    pub async fn latest_per_source_collection(&self) -> LedgerResult<Vec<TrackedCollection>> {
        let rows = sqlx::query(
            r#"
            SELECT s.source_id, s.absolute_path, a.action_id, a.timestamp, a.sha256,
                   c.collection, c.action
            FROM RagActionCollection c
            JOIN RagAction a ON a.action_id = c.action_id
            JOIN RagSource s ON s.source_id = a.source_id
            ORDER BY s.source_id, c.collection, a.timestamp DESC, a.action_id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        // Rows arrive newest-first within each pair; keep the first one.
        let mut tracked: BTreeMap<(i64, String), TrackedCollection> = BTreeMap::new();
        for row in &rows {
            let source = source_from_row(row)?;
            let collection: String = row.try_get("collection")?;
            let key = (source.source_id, collection.clone());
            if tracked.contains_key(&key) {
                continue;
            }
            let action: String = row.try_get("action")?;
            tracked.insert(
                key,
                TrackedCollection {
                    source,
                    collection,
                    action: action.parse()?,
                    action_id: row.try_get("action_id")?,
                    sha256: row.try_get("sha256")?,
                },
            );
        }

        let mut out: Vec<TrackedCollection> = tracked.into_values().collect();
        out.sort_by(|a, b| {
            a.source
                .absolute_path
                .cmp(&b.source.absolute_path)
                .then_with(|| a.collection.cmp(&b.collection))
        });
        Ok(out)
    }

    /// Every action recorded for `path`, oldest first.
    pub async fn history(&self, path: &Path) -> LedgerResult<Vec<(Action, Vec<CollectionAction>)>> {
        let rows = sqlx::query(
            r#"
            SELECT a.source_id, a.action_id, a.timestamp, a.n_chunks, a.error, a.sha256
            FROM RagAction a
            JOIN RagSource s ON s.source_id = a.source_id
            WHERE s.absolute_path = ?
            ORDER BY a.timestamp, a.action_id
            "#,
        )
        .bind(path_str(path))
        .fetch_all(&self.pool)
        .await?;

        let mut history = Vec::with_capacity(rows.len());
        for row in &rows {
            let source_id: i64 = row.try_get("source_id")?;
            let action = action_from_row(row, source_id)?;
            let collections = self.collection_actions(action.action_id).await?;
            history.push((action, collections));
        }
        Ok(history)
    }

    pub async fn collection_actions(&self, action_id: i64) -> LedgerResult<Vec<CollectionAction>> {
        let rows = sqlx::query(
            r#"
            SELECT action_id, action, collection, timestamp
            FROM RagActionCollection WHERE action_id = ?
            ORDER BY collection
            "#,
        )
        .bind(action_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(collection_action_from_row).collect()
    }

    pub async fn counts(&self) -> LedgerResult<LedgerCounts> {
        let sources: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM RagSource")
            .fetch_one(&self.pool)
            .await?;
        let actions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM RagAction")
            .fetch_one(&self.pool)
            .await?;
        let collection_actions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM RagActionCollection")
            .fetch_one(&self.pool)
            .await?;
        Ok(LedgerCounts {
            sources,
            actions,
            collection_actions,
        })
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn source_from_row(row: &SqliteRow) -> LedgerResult<Source> {
    let path: String = row.try_get("absolute_path")?;
    Ok(Source {
        source_id: row.try_get("source_id")?,
        absolute_path: path.into(),
    })
}

fn action_from_row(row: &SqliteRow, source_id: i64) -> LedgerResult<Action> {
    let timestamp: String = row.try_get("timestamp")?;
    Ok(Action {
        action_id: row.try_get("action_id")?,
        source_id,
        timestamp: parse_timestamp(&timestamp)?,
        n_chunks: row.try_get("n_chunks")?,
        error: row.try_get("error")?,
        sha256: row.try_get("sha256")?,
    })
}

fn collection_action_from_row(row: &SqliteRow) -> LedgerResult<CollectionAction> {
    let action: String = row.try_get("action")?;
    let timestamp: String = row.try_get("timestamp")?;
    Ok(CollectionAction {
        action_id: row.try_get("action_id")?,
        action: action.parse()?,
        collection: row.try_get("collection")?,
        timestamp: parse_timestamp(&timestamp)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn open(tmp: &TempDir) -> LedgerStore {
        LedgerStore::open(&tmp.path().join("ledger.sqlite"))
            .await
            .unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn upsert_source_returns_existing_row() {
        let tmp = TempDir::new().unwrap();
        let ledger = open(&tmp).await;
        let path = PathBuf::from("/docs/a.pdf");

        let first = ledger.upsert_source(&path).await.unwrap();
        let second = ledger.upsert_source(&path).await.unwrap();
        let other = ledger.upsert_source(Path::new("/docs/b.pdf")).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first.source_id, other.source_id);
        assert_eq!(ledger.counts().await.unwrap().sources, 2);
    }

    #[tokio::test]
    async fn duplicate_source_rows_are_reported() {
        let tmp = TempDir::new().unwrap();
        let ledger = open(&tmp).await;
        let path = PathBuf::from("/docs/a.pdf");
        for id in [10, 11] {
            ledger
                .put_source(&Source {
                    source_id: id,
                    absolute_path: path.clone(),
                })
                .await
                .unwrap();
        }

        let err = ledger.upsert_source(&path).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateSource { count: 2, .. }));
    }

    #[tokio::test]
    async fn record_action_always_allocates_new_key() {
        let tmp = TempDir::new().unwrap();
        let ledger = open(&tmp).await;
        let source = ledger.upsert_source(Path::new("/docs/a.pdf")).await.unwrap();

        let a1 = ledger
            .record_action(source.source_id, 3, None, "h1", t0())
            .await
            .unwrap();
        let a2 = ledger
            .record_action(source.source_id, 3, None, "h1", t0())
            .await
            .unwrap();
        assert!(a2.action_id > a1.action_id);
        assert_eq!(ledger.counts().await.unwrap().actions, 2);
    }

    #[tokio::test]
    async fn latest_action_wins_regardless_of_history_length() {
        let tmp = TempDir::new().unwrap();
        let ledger = open(&tmp).await;
        let source = ledger.upsert_source(Path::new("/docs/a.pdf")).await.unwrap();

        let mut last = None;
        for i in 0..6 {
            let ts = t0() + Duration::seconds(i);
            let action = ledger
                .record_action(source.source_id, i, None, &format!("h{}", i), ts)
                .await
                .unwrap();
            ledger
                .record_collection_action(action.action_id, "documents", ActionType::Update, ts)
                .await
                .unwrap();
            last = Some(action);
        }
        let last = last.unwrap();
        ledger
            .record_collection_action(last.action_id, "archive", ActionType::New, last.timestamp)
            .await
            .unwrap();

        let latest = ledger.latest_active_per_source().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].action, last);
        let collections: Vec<_> = latest[0]
            .collections
            .iter()
            .map(|c| (c.collection.as_str(), c.action))
            .collect();
        assert_eq!(
            collections,
            vec![("archive", ActionType::New), ("documents", ActionType::Update)]
        );
    }

    #[tokio::test]
    async fn equal_timestamps_break_ties_by_action_id() {
        let tmp = TempDir::new().unwrap();
        let ledger = open(&tmp).await;
        let source = ledger.upsert_source(Path::new("/docs/a.pdf")).await.unwrap();

        let first = ledger
            .record_action(source.source_id, 1, None, "first", t0())
            .await
            .unwrap();
        let second = ledger
            .record_action(source.source_id, 2, None, "second", t0())
            .await
            .unwrap();
        for a in [&first, &second] {
            ledger
                .record_collection_action(a.action_id, "documents", ActionType::New, t0())
                .await
                .unwrap();
        }

        let latest = ledger.latest_active_per_source().await.unwrap();
        assert_eq!(latest[0].action.action_id, second.action_id);
        assert_eq!(latest[0].action.sha256, "second");
    }

    #[tokio::test]
    async fn later_timestamp_beats_higher_action_id() {
        let tmp = TempDir::new().unwrap();
        let ledger = open(&tmp).await;
        let source = ledger.upsert_source(Path::new("/docs/a.pdf")).await.unwrap();

        // Replayed with an injected key that sorts first but happened last.
        ledger
            .record_action(source.source_id, 1, None, "older", t0())
            .await
            .unwrap();
        let replayed = Action {
            action_id: 0,
            source_id: source.source_id,
            timestamp: t0() + Duration::minutes(5),
            n_chunks: 4,
            error: None,
            sha256: "newer".to_string(),
        };
        ledger.put_action(&replayed).await.unwrap();

        let latest = ledger.latest_active_per_source().await.unwrap();
        assert_eq!(latest[0].action, replayed);
    }

    #[tokio::test]
    async fn put_action_overwrites_by_key() {
        let tmp = TempDir::new().unwrap();
        let ledger = open(&tmp).await;
        let source = ledger.upsert_source(Path::new("/docs/a.pdf")).await.unwrap();
        let mut action = ledger
            .record_action(source.source_id, 1, None, "h", t0())
            .await
            .unwrap();

        action.error = Some("parse failure".to_string());
        action.n_chunks = 0;
        ledger.put_action(&action).await.unwrap();
        ledger.put_action(&action).await.unwrap();

        let counts = ledger.counts().await.unwrap();
        assert_eq!(counts.actions, 1);
        let history = ledger.history(Path::new("/docs/a.pdf")).await.unwrap();
        assert_eq!(history[0].0, action);
    }

    #[tokio::test]
    async fn sources_without_actions_are_not_active() {
        let tmp = TempDir::new().unwrap();
        let ledger = open(&tmp).await;
        ledger.upsert_source(Path::new("/docs/a.pdf")).await.unwrap();
        assert!(ledger.latest_active_per_source().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn per_collection_state_survives_newer_sibling_actions() {
        let tmp = TempDir::new().unwrap();
        let ledger = open(&tmp).await;
        let source = ledger.upsert_source(Path::new("/docs/a.pdf")).await.unwrap();

        let a1 = ledger
            .record_action(source.source_id, 2, None, "h1", t0())
            .await
            .unwrap();
        ledger
            .record_collection_action(a1.action_id, "alpha", ActionType::New, t0())
            .await
            .unwrap();
        let later = t0() + Duration::seconds(1);
        let a2 = ledger
            .record_action(source.source_id, 2, None, "h1", later)
            .await
            .unwrap();
        ledger
            .record_collection_action(a2.action_id, "beta", ActionType::New, later)
            .await
            .unwrap();

        let latest = ledger.latest_active_per_source().await.unwrap();
        assert_eq!(latest[0].collections.len(), 1);
        assert_eq!(latest[0].collections[0].collection, "beta");

        let tracked = ledger.latest_per_source_collection().await.unwrap();
        let pairs: Vec<_> = tracked
            .iter()
            .map(|t| (t.collection.as_str(), t.action_id, t.sha256.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("alpha", a1.action_id, "h1"), ("beta", a2.action_id, "h1")]
        );
    }

    #[tokio::test]
    async fn history_lists_actions_oldest_first() {
        let tmp = TempDir::new().unwrap();
        let ledger = open(&tmp).await;
        let path = Path::new("/docs/a.pdf");
        let source = ledger.upsert_source(path).await.unwrap();

        for (i, (kind, sha)) in [(ActionType::New, "h1"), (ActionType::Delete, "")]
            .into_iter()
            .enumerate()
        {
            let ts = t0() + Duration::seconds(i as i64);
            let action = ledger
                .record_action(source.source_id, 0, None, sha, ts)
                .await
                .unwrap();
            ledger
                .record_collection_action(action.action_id, "documents", kind, ts)
                .await
                .unwrap();
        }

        let history = ledger.history(path).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].1[0].action, ActionType::New);
        assert_eq!(history[1].0.sha256, "");
        assert_eq!(history[1].1[0].action, ActionType::Delete);
    }

    #[tokio::test]
    async fn collection_action_requires_real_action() {
        let tmp = TempDir::new().unwrap();
        let ledger = open(&tmp).await;
        let err = ledger
            .record_collection_action(999, "documents", ActionType::New, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Database(_)));
    }
}
