//! Reconciliation: desired filesystem state vs. ledger-known state.
//!
//! Planning is side-effect free apart from hashing file content, so a pass
//! interrupted during execution can simply be planned again.
//!
//! Per (path, collection) pair:
//!
//! | known before | desired now | intent |
//! |--------------|-------------|--------|
//! | no  | yes | `new` |
//! | yes | yes | `update` if the hash changed, otherwise none |
//! | yes | no  | `delete` |
//! | no  | no  | none |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::connector_fs::DesiredFiles;
use crate::error::LedgerError;
use crate::fingerprint::{Fingerprinter, ABSENT};
use crate::models::{ActionType, TrackedCollection};

/// Before/after view of one (path, collection) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransition {
    /// Hash recorded when this collection last received the file.
    pub present_before_sha256: Option<String>,
    pub present_after: bool,
}

impl FileTransition {
    /// Decide the intent for this pair.
    ///
    /// A pair that is known and still desired needs the live hash; failing to
    /// compute it means the file vanished after enumeration, which is an
    /// integrity violation rather than something to skip.
    pub fn future_action(
        &self,
        path: &Path,
        fingerprints: &mut Fingerprinter,
    ) -> Result<Option<ActionType>, LedgerError> {
        match (&self.present_before_sha256, self.present_after) {
            (None, true) => Ok(Some(ActionType::New)),
            (None, false) => Ok(None),
            (Some(_), false) => Ok(Some(ActionType::Delete)),
            (Some(before), true) => {
                let current =
                    fingerprints
                        .fingerprint(path)
                        .map_err(|source| LedgerError::Fingerprint {
                            path: path.to_path_buf(),
                            source,
                        })?;
                if current == ABSENT {
                    return Err(LedgerError::MissingContent {
                        path: path.to_path_buf(),
                    });
                }
                Ok((before != current).then_some(ActionType::Update))
            }
        }
    }
}

/// Everything known about one path, per collection.
#[derive(Debug, Clone)]
pub struct FileState {
    pub path: PathBuf,
    pub collections: BTreeMap<String, FileTransition>,
}

impl FileState {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            collections: BTreeMap::new(),
        }
    }

    /// Intents for this file, split into uploads (`new`/`update`) and deletes.
    pub fn plan(&self, fingerprints: &mut Fingerprinter) -> Result<FilePlan, LedgerError> {
        let mut plan = FilePlan {
            path: self.path.clone(),
            uploads: Vec::new(),
            deletes: Vec::new(),
        };
        for (collection, transition) in &self.collections {
            match transition.future_action(&self.path, fingerprints)? {
                Some(ActionType::Delete) => plan.deletes.push(collection.clone()),
                Some(action) => plan.uploads.push((collection.clone(), action)),
                None => {}
            }
        }
        Ok(plan)
    }
}

/// Pending work for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePlan {
    pub path: PathBuf,
    pub uploads: Vec<(String, ActionType)>,
    pub deletes: Vec<String>,
}

impl FilePlan {
    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty() && self.deletes.is_empty()
    }

    /// Every intent as `(collection, action)`, uploads first.
    pub fn intents(&self) -> impl Iterator<Item = (&str, ActionType)> {
        self.uploads
            .iter()
            .map(|(c, a)| (c.as_str(), *a))
            .chain(self.deletes.iter().map(|c| (c.as_str(), ActionType::Delete)))
    }
}

/// Per-path states for one pass, ordered by path.
#[derive(Debug, Clone, Default)]
pub struct FileStates {
    pub states: BTreeMap<PathBuf, FileState>,
}

impl FileStates {
    pub fn add_file(&mut self, path: &Path) -> &mut FileState {
        self.states
            .entry(path.to_path_buf())
            .or_insert_with(|| FileState::new(path.to_path_buf()))
    }

    /// Files with at least one intent, in path order.
    pub fn pending(&self, fingerprints: &mut Fingerprinter) -> Result<Vec<FilePlan>, LedgerError> {
        let mut plans = Vec::new();
        for state in self.states.values() {
            let plan = state.plan(fingerprints)?;
            if !plan.is_empty() {
                plans.push(plan);
            }
        }
        Ok(plans)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Merge desired state and ledger state into per-file transitions.
///
/// Pairs whose last recorded action is `delete` are already known absent
/// and do not count as "before".
pub fn plan_actions(desired: &DesiredFiles, known: &[TrackedCollection]) -> FileStates {
    let mut states = FileStates::default();

    for (collection, paths) in desired {
        for path in paths {
            states.add_file(path).collections.insert(
                collection.clone(),
                FileTransition {
                    present_before_sha256: None,
                    present_after: true,
                },
            );
        }
    }

    for tracked in known {
        if tracked.action == ActionType::Delete {
            continue;
        }
        let transition = states
            .add_file(&tracked.source.absolute_path)
            .collections
            .entry(tracked.collection.clone())
            .or_insert(FileTransition {
                present_before_sha256: None,
                present_after: false,
            });
        transition.present_before_sha256 = Some(tracked.sha256.clone());
    }

    states
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::file_sha256;
    use crate::models::Source;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn tracked(path: &Path, collection: &str, action: ActionType, sha: &str) -> TrackedCollection {
        TrackedCollection {
            source: Source {
                source_id: 1,
                absolute_path: path.to_path_buf(),
            },
            collection: collection.to_string(),
            action,
            action_id: 1,
            sha256: sha.to_string(),
        }
    }

    fn desired(entries: &[(&str, &Path)]) -> DesiredFiles {
        let mut d = DesiredFiles::new();
        for (collection, path) in entries {
            d.entry(collection.to_string())
                .or_insert_with(BTreeSet::new)
                .insert(path.to_path_buf());
        }
        d
    }

    #[test]
    fn transition_table() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.txt");
        fs::write(&path, "content").unwrap();
        let sha = file_sha256(&path).unwrap();
        let mut fp = Fingerprinter::new();

        let t = |before: Option<&str>, after: bool| FileTransition {
            present_before_sha256: before.map(str::to_string),
            present_after: after,
        };

        assert_eq!(
            t(None, true).future_action(&path, &mut fp).unwrap(),
            Some(ActionType::New)
        );
        assert_eq!(t(None, false).future_action(&path, &mut fp).unwrap(), None);
        assert_eq!(
            t(Some("stale"), true).future_action(&path, &mut fp).unwrap(),
            Some(ActionType::Update)
        );
        assert_eq!(t(Some(sha.as_str()), true).future_action(&path, &mut fp).unwrap(), None);
        assert_eq!(
            t(Some(sha.as_str()), false).future_action(&path, &mut fp).unwrap(),
            Some(ActionType::Delete)
        );
    }

    #[test]
    fn present_but_unreadable_file_fails_loudly() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vanished.txt");
        let transition = FileTransition {
            present_before_sha256: Some("abc".to_string()),
            present_after: true,
        };
        let err = transition
            .future_action(&path, &mut Fingerprinter::new())
            .unwrap_err();
        assert!(matches!(err, LedgerError::MissingContent { .. }));
    }

    #[test]
    fn fan_out_is_decided_per_collection() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.txt");
        fs::write(&path, "content").unwrap();
        let sha = file_sha256(&path).unwrap();

        let states = plan_actions(
            &desired(&[("alpha", &path), ("beta", &path)]),
            &[tracked(&path, "beta", ActionType::New, &sha)],
        );
        let plans = states.pending(&mut Fingerprinter::new()).unwrap();

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].uploads, vec![("alpha".to_string(), ActionType::New)]);
        assert!(plans[0].deletes.is_empty());
    }

    #[test]
    fn removed_file_is_deleted_from_every_known_collection() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gone.txt");

        let states = plan_actions(
            &DesiredFiles::new(),
            &[
                tracked(&path, "alpha", ActionType::New, "h"),
                tracked(&path, "beta", ActionType::Update, "h"),
            ],
        );
        let plans = states.pending(&mut Fingerprinter::new()).unwrap();
        assert_eq!(plans[0].deletes, vec!["alpha".to_string(), "beta".to_string()]);
        let intents: Vec<_> = plans[0].intents().collect();
        assert_eq!(
            intents,
            vec![("alpha", ActionType::Delete), ("beta", ActionType::Delete)]
        );
    }

    #[test]
    fn already_deleted_pairs_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gone.txt");

        let states = plan_actions(
            &DesiredFiles::new(),
            &[tracked(&path, "alpha", ActionType::Delete, "")],
        );
        assert_eq!(states.len(), 0);
        assert!(states.pending(&mut Fingerprinter::new()).unwrap().is_empty());
    }

    #[test]
    fn deleted_then_restored_file_is_new_again() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("back.txt");
        fs::write(&path, "again").unwrap();

        let states = plan_actions(
            &desired(&[("alpha", &path)]),
            &[tracked(&path, "alpha", ActionType::Delete, "")],
        );
        let plans = states.pending(&mut Fingerprinter::new()).unwrap();
        assert_eq!(plans[0].uploads, vec![("alpha".to_string(), ActionType::New)]);
    }

    #[test]
    fn file_leaving_a_collection_but_staying_on_disk_is_deleted_there() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.txt");
        fs::write(&path, "content").unwrap();
        let sha = file_sha256(&path).unwrap();

        let states = plan_actions(
            &desired(&[("alpha", &path)]),
            &[
                tracked(&path, "alpha", ActionType::New, &sha),
                tracked(&path, "beta", ActionType::New, &sha),
            ],
        );
        let plans = states.pending(&mut Fingerprinter::new()).unwrap();
        assert!(plans[0].uploads.is_empty());
        assert_eq!(plans[0].deletes, vec!["beta".to_string()]);
    }

    #[test]
    fn planning_is_repeatable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.txt");
        fs::write(&path, "content").unwrap();
        let d = desired(&[("alpha", &path)]);

        let first = plan_actions(&d, &[]).pending(&mut Fingerprinter::new()).unwrap();
        let second = plan_actions(&d, &[]).pending(&mut Fingerprinter::new()).unwrap();
        assert_eq!(first, second);
    }
}
