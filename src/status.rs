//! Ledger inspection commands: `status`, `history` and `bots`.

use std::path::Path;

use anyhow::Result;

use crate::config::{absolute_path, Config};
use crate::ledger::LedgerStore;
use crate::models::{format_timestamp, CollectionAction};

/// `ragl status`: the current action of every source, plus row counts.
pub async fn run_status(config: &Config) -> Result<()> {
    let ledger = LedgerStore::open(&config.db.path).await?;
    let latest = ledger.latest_active_per_source().await?;
    let counts = ledger.counts().await?;

    println!("ledger: {}", config.db.path.display());
    println!(
        "  sources: {}  actions: {}  collection actions: {}",
        counts.sources, counts.actions, counts.collection_actions
    );

    if !latest.is_empty() {
        println!();
        println!(
            "{:>6}  {:<27}  {:>6}  {:<12}  {:<28}  PATH",
            "ACTION", "TIMESTAMP", "CHUNKS", "SHA256", "COLLECTIONS"
        );
        for entry in &latest {
            println!(
                "{:>6}  {:<27}  {:>6}  {:<12}  {:<28}  {}",
                entry.action.action_id,
                format_timestamp(&entry.action.timestamp),
                entry.action.n_chunks,
                short_sha(&entry.action.sha256),
                describe_collections(&entry.collections),
                entry.source.absolute_path.display()
            );
        }
    }

    ledger.close().await;
    Ok(())
}

/// `ragl history <path>`: every action recorded for one file, oldest first.
pub async fn run_history(config: &Config, path: &Path) -> Result<()> {
    let path = absolute_path(path)?;
    let ledger = LedgerStore::open(&config.db.path).await?;
    let history = ledger.history(&path).await?;

    if history.is_empty() {
        println!("no actions recorded for {}", path.display());
    }
    for (action, collections) in &history {
        println!(
            "#{} {} chunks={} sha256={}",
            action.action_id,
            format_timestamp(&action.timestamp),
            action.n_chunks,
            short_sha(&action.sha256)
        );
        if let Some(err) = &action.error {
            println!("  error: {}", err);
        }
        for ca in collections {
            println!("  {} {}", ca.action, ca.collection);
        }
    }

    ledger.close().await;
    Ok(())
}

/// `ragl bots`: configured bots and whether their directories exist.
pub fn list_bots(config: &Config) -> Result<()> {
    println!(
        "{:<20} {:<20} {:<8} {:>5}  DIRS",
        "BOT", "COLLECTION", "ENABLED", "GLOBS"
    );
    for bot in &config.bots {
        let Some(rag) = &bot.rag else {
            println!("{:<20} {:<20} {:<8} {:>5}  -", bot.name, "-", false, 0);
            continue;
        };
        let dirs: Vec<String> = rag
            .files
            .iter()
            .map(|fg| {
                let state = if fg.dir.is_dir() { "ok" } else { "missing" };
                format!("{} ({})", fg.dir.display(), state)
            })
            .collect();
        println!(
            "{:<20} {:<20} {:<8} {:>5}  {}",
            bot.name,
            rag.collection,
            rag.enabled,
            rag.files.len(),
            dirs.join(", ")
        );
    }
    Ok(())
}

/// First 12 hex digits, or `-` for an absent file.
fn short_sha(sha256: &str) -> &str {
    if sha256.is_empty() {
        "-"
    } else {
        &sha256[..sha256.len().min(12)]
    }
}

/// `new:docs,delete:archive`, or `-` for none.
fn describe_collections(collections: &[CollectionAction]) -> String {
    if collections.is_empty() {
        return "-".to_string();
    }
    collections
        .iter()
        .map(|ca| format!("{}:{}", ca.action, ca.collection))
        .collect::<Vec<_>>()
        .join(",")
}
