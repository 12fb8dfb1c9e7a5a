//! Filesystem enumeration of bot file sets.
//!
//! Each configured `(dir, glob)` pair is walked and matched against paths
//! relative to `dir`. The result is the desired state: for every collection,
//! the set of absolute paths that should currently be ingested into it.

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::{BotConfig, FileGlob};

/// collection name → absolute paths desired in it.
pub type DesiredFiles = BTreeMap<String, BTreeSet<PathBuf>>;

/// Build the desired state from every bot with ingestion enabled.
///
/// A file matched by several bots sharing a collection appears once; a file
/// feeding several collections appears under each of them.
pub fn desired_files(bots: &[BotConfig]) -> Result<DesiredFiles> {
    let mut desired = DesiredFiles::new();
    for bot in bots {
        let Some(rag) = bot.active_rag() else {
            continue;
        };
        let entry = desired.entry(rag.collection.clone()).or_default();
        for fg in &rag.files {
            entry.extend(scan_file_glob(fg)?);
        }
    }
    Ok(desired)
}

/// All regular files under `fg.dir` whose relative path matches `fg.glob`,
/// sorted.
///
/// A missing directory matches nothing.
pub fn scan_file_glob(fg: &FileGlob) -> Result<Vec<PathBuf>> {
    let root = &fg.dir;
    if !root.is_dir() {
        warn!(dir = %root.display(), glob = %fg.glob, "glob directory does not exist");
        return Ok(Vec::new());
    }

    let matcher = build_globset(std::slice::from_ref(&fg.glob))?;
    let root = std::path::absolute(root)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        if matcher.is_match(relative) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// `*` stops at path separators; `**` crosses them.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
    }
    Ok(builder.build()?)
}
