//! Snapshot-vs-diff storage decisions and function-body deduplication
//!
//! For each (commit, file) pair the policy either stores the whole file plus its code
//! units, deduplicated against every unit seen so far, or only the unified diff
//! against the first parent.

mod dedup;
mod diff_stats;

pub use dedup::{Claim, DeduplicationIndex, normalized_hash, raw_hash};
pub use diff_stats::{change_ratio, changed_units};

use crate::config::PolicyConfig;
use crate::error::Result;
use crate::graph::{Commit, CommitGraph};
use crate::source::{SourceControl, UnitKind, UnitParser};
use crate::storage::{DiffUnit, Reference, Snapshot, StoredUnit, UnitId};
use std::collections::HashMap;
use std::fmt;

/// Why a full snapshot was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionReason {
    /// The commit has no parents
    Root,
    /// The commit has two or more parents
    Merge,
    /// Forced by the snapshot interval
    Periodic,
    /// The file does not exist at the first parent
    NewFile,
    /// The change ratio exceeded the threshold
    ChangeRatio,
    /// Parent content or the diff could not be retrieved
    ContentUnavailable,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Root => "root",
            DecisionReason::Merge => "merge",
            DecisionReason::Periodic => "periodic",
            DecisionReason::NewFile => "new_file",
            DecisionReason::ChangeRatio => "change_ratio",
            DecisionReason::ContentUnavailable => "content_unavailable",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to store for one (commit, file) pair
#[derive(Debug, Clone, PartialEq)]
pub enum StorageDecision {
    FullSnapshot(DecisionReason),
    IncrementalDiff {
        parent_sha: String,
        diff: String,
        change_ratio: f64,
    },
}

impl StorageDecision {
    pub fn is_full_snapshot(&self) -> bool {
        matches!(self, StorageDecision::FullSnapshot(_))
    }
}

/// Units to persist for one (commit, file) pair
#[derive(Debug, Clone, PartialEq)]
pub enum StoragePlan {
    /// A file snapshot followed by one Snapshot or Reference per code unit
    FullSnapshot {
        reason: DecisionReason,
        units: Vec<StoredUnit>,
    },
    IncrementalDiff { diff: DiffUnit },
    /// The file no longer exists at the commit
    Removed,
}

impl StoragePlan {
    pub fn into_units(self) -> Vec<StoredUnit> {
        match self {
            StoragePlan::FullSnapshot { units, .. } => units,
            StoragePlan::IncrementalDiff { diff } => vec![StoredUnit::Diff(diff)],
            StoragePlan::Removed => Vec::new(),
        }
    }
}

/// Storage policy with its deduplication state
///
/// The index is owned by the policy; share one policy between the workers of a run
/// so every worker deduplicates against the same bodies.
#[derive(Debug, Default)]
pub struct StoragePolicy {
    config: PolicyConfig,
    index: DeduplicationIndex,
}

impl StoragePolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self::with_index(config, DeduplicationIndex::new())
    }

    /// Continue with an index rebuilt from an existing store
    pub fn with_index(config: PolicyConfig, index: DeduplicationIndex) -> Self {
        Self { config, index }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn dedup_index(&self) -> &DeduplicationIndex {
        &self.index
    }

    /// Decide between a full snapshot and a diff for `path` at `sha`
    ///
    /// Only an unknown commit is an error. Lookup failures choose a full snapshot.
    pub fn decide(
        &self,
        graph: &CommitGraph,
        source: &dyn SourceControl,
        sha: &str,
        path: &str,
        commit_index: usize,
    ) -> Result<StorageDecision> {
        let commit = graph.commit(sha)?;
        let current = match source.file_content(sha, path) {
            Ok(content) => content.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Cannot read {} at {}, storing full snapshot: {}", path, sha, e);
                return Ok(StorageDecision::FullSnapshot(
                    DecisionReason::ContentUnavailable,
                ));
            }
        };
        Ok(self.evaluate(commit, source, path, commit_index, &current))
    }

    /// Build and deduplicate the units to store for `path` at `sha`
    ///
    /// Fails only for an unknown commit or when the file content itself cannot be
    /// read. Snapshot claims are registered in the dedup index as the plan is built.
    pub fn decide_storage(
        &self,
        graph: &CommitGraph,
        source: &dyn SourceControl,
        parser: &dyn UnitParser,
        sha: &str,
        path: &str,
        commit_index: usize,
    ) -> Result<StoragePlan> {
        let plan = self.plan_storage(graph, source, parser, sha, path, commit_index)?;
        Ok(self.deduplicate(plan))
    }

    /// Build the units to store for `path` at `sha` without touching the dedup index
    ///
    /// Every code unit of a full snapshot is planned as a Snapshot; pass the plan
    /// through [`StoragePolicy::deduplicate`] before storing it.
    pub fn plan_storage(
        &self,
        graph: &CommitGraph,
        source: &dyn SourceControl,
        parser: &dyn UnitParser,
        sha: &str,
        path: &str,
        commit_index: usize,
    ) -> Result<StoragePlan> {
        let commit = graph.commit(sha)?;
        let Some(current) = source.file_content(sha, path)? else {
            return Ok(StoragePlan::Removed);
        };

        let plan = match self.evaluate(commit, source, path, commit_index, &current) {
            StorageDecision::FullSnapshot(reason) => StoragePlan::FullSnapshot {
                reason,
                units: self.snapshot_units(sha, path, &current, parser),
            },
            StorageDecision::IncrementalDiff {
                parent_sha, diff, ..
            } => StoragePlan::IncrementalDiff {
                diff: DiffUnit {
                    id: UnitId::for_diff(sha, path),
                    sha: sha.to_string(),
                    path: path.to_string(),
                    language: parser.language_for(path),
                    parent_sha,
                    changed_units: changed_units(&diff),
                    diff,
                },
            },
        };
        Ok(plan)
    }

    /// Claim the code-unit bodies of a plan, turning already-held ones into References
    ///
    /// Claims happen in unit order, so calling this for a commit's files in path order
    /// makes the first path canonical.
    pub fn deduplicate(&self, plan: StoragePlan) -> StoragePlan {
        let StoragePlan::FullSnapshot { reason, units } = plan else {
            return plan;
        };
        let units = units
            .into_iter()
            .map(|unit| match unit {
                StoredUnit::Snapshot(snapshot) if snapshot.kind != UnitKind::File => {
                    // A resumed run finds its own earlier claim, which stays a snapshot
                    match self.index.claim(&snapshot.content_hash, &snapshot.id) {
                        Claim::Existing(canonical) if canonical != snapshot.id => {
                            StoredUnit::Reference(Reference {
                                id: snapshot.id,
                                sha: snapshot.sha,
                                path: snapshot.path,
                                kind: snapshot.kind,
                                name: snapshot.name,
                                line_range: snapshot.line_range,
                                content_hash: snapshot.content_hash,
                                snapshot_id: canonical,
                            })
                        }
                        _ => StoredUnit::Snapshot(snapshot),
                    }
                }
                other => other,
            })
            .collect();
        StoragePlan::FullSnapshot { reason, units }
    }

    fn evaluate(
        &self,
        commit: &Commit,
        source: &dyn SourceControl,
        path: &str,
        commit_index: usize,
        current: &str,
    ) -> StorageDecision {
        use StorageDecision::FullSnapshot;

        let Some(parent) = commit.first_parent() else {
            return FullSnapshot(DecisionReason::Root);
        };
        if commit.is_merge() {
            return FullSnapshot(DecisionReason::Merge);
        }
        if self.config.snapshot_interval > 0 && commit_index % self.config.snapshot_interval == 0
        {
            return FullSnapshot(DecisionReason::Periodic);
        }

        let parent_content = match source.file_content(parent, path) {
            Ok(Some(content)) => content,
            Ok(None) => return FullSnapshot(DecisionReason::NewFile),
            Err(e) => {
                tracing::warn!(
                    "Cannot read {} at parent {}, storing full snapshot: {}",
                    path,
                    parent,
                    e
                );
                return FullSnapshot(DecisionReason::ContentUnavailable);
            }
        };

        let diff = match source.diff(&commit.sha, path, parent) {
            Ok(Some(diff)) => diff,
            Ok(None) => return FullSnapshot(DecisionReason::ContentUnavailable),
            Err(e) => {
                tracing::warn!(
                    "Cannot diff {} at {}, storing full snapshot: {}",
                    path,
                    commit.sha,
                    e
                );
                return FullSnapshot(DecisionReason::ContentUnavailable);
            }
        };

        let ratio = change_ratio(&diff, current, &parent_content);
        if ratio > self.config.change_threshold {
            return FullSnapshot(DecisionReason::ChangeRatio);
        }

        StorageDecision::IncrementalDiff {
            parent_sha: parent.to_string(),
            diff,
            change_ratio: ratio,
        }
    }

    fn snapshot_units(
        &self,
        sha: &str,
        path: &str,
        content: &str,
        parser: &dyn UnitParser,
    ) -> Vec<StoredUnit> {
        let language = parser.language_for(path);
        let mut units = vec![StoredUnit::Snapshot(Snapshot {
            id: UnitId::for_file(sha, path),
            sha: sha.to_string(),
            path: path.to_string(),
            language: language.clone(),
            kind: UnitKind::File,
            name: path.to_string(),
            line_range: (1, content.lines().count()),
            content: content.to_string(),
            content_hash: raw_hash(content),
        })];

        let Some(language) = language else {
            return units;
        };
        let code_units = match parser.parse_units(&language, content) {
            Ok(code_units) => code_units,
            Err(e) => {
                tracing::warn!("Failed to parse {} at {}: {}", path, sha, e);
                return units;
            }
        };

        let mut ordinals: HashMap<usize, usize> = HashMap::new();
        for unit in code_units {
            let ordinal = ordinals.entry(unit.start_line()).or_insert(0);
            let id = UnitId::for_unit(sha, path, unit.start_line(), *ordinal);
            *ordinal += 1;

            let body = unit.body(content);
            units.push(StoredUnit::Snapshot(Snapshot {
                id,
                sha: sha.to_string(),
                path: path.to_string(),
                language: Some(language.clone()),
                kind: unit.kind,
                content_hash: normalized_hash(body),
                name: unit.name,
                line_range: unit.line_range,
                content: body.to_string(),
            }));
        }

        units
    }
}
