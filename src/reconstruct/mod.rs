//! File reconstruction from stored snapshots and diffs
//!
//! A request walks `CacheCheck -> SnapshotSearch -> (ExactHit | PathSearch) ->
//! DiffReplay -> Done`, leaving through `Fallback` (a direct source-control read)
//! whenever the stored data cannot answer it.
//!
//! Snapshot candidates are the ancestors of the target holding a file snapshot,
//! deepest first. Path search takes the first candidate whose replay is fully
//! covered by stored units and only settles for an uncovered chain (live diffs or
//! warnings) when no candidate is covered.

mod cache;

pub use cache::ReconstructionCache;

use crate::config::ReconstructionConfig;
use crate::error::{HistoryError, Result};
use crate::graph::CommitGraph;
use crate::patch::apply_unified_diff;
use crate::source::SourceControl;
use crate::storage::{Snapshot, UnitStore};
use rayon::prelude::*;
use std::cmp::Reverse;
use std::fmt;

/// Where reconstructed content came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Cache,
    /// A file snapshot stored at the target commit
    Snapshot { sha: String },
    /// A file snapshot at an ancestor plus `steps` replayed commits
    Replay { snapshot_sha: String, steps: usize },
    /// Read directly from source control
    SourceControl,
}

/// A diff that could not be retrieved or applied during replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchWarning {
    pub sha: String,
    pub path: String,
    pub reason: String,
}

impl fmt::Display for PatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.path, self.sha, self.reason)
    }
}

impl From<PatchWarning> for HistoryError {
    fn from(warning: PatchWarning) -> Self {
        HistoryError::PatchApplyFailure {
            sha: warning.sha,
            path: warning.path,
            reason: warning.reason,
        }
    }
}

/// Rebuilt file content
///
/// Content with warnings is best-effort: at least one diff was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    pub content: String,
    pub origin: Origin,
    pub warnings: Vec<PatchWarning>,
}

impl Reconstruction {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// The content, or the first warning as a `PatchApplyFailure`
    pub fn into_exact(self) -> Result<String> {
        match self.warnings.into_iter().next() {
            Some(warning) => Err(warning.into()),
            None => Ok(self.content),
        }
    }
}

enum Step {
    CacheCheck,
    SnapshotSearch,
    ExactHit(Snapshot),
    PathSearch(Vec<Snapshot>),
    DiffReplay(Snapshot, Vec<String>),
    Fallback,
}

/// Rebuilds file contents at arbitrary commits
pub struct Reconstructor<'a> {
    graph: &'a CommitGraph,
    store: &'a dyn UnitStore,
    source: &'a dyn SourceControl,
    config: ReconstructionConfig,
    cache: ReconstructionCache,
}

impl<'a> Reconstructor<'a> {
    pub fn new(
        graph: &'a CommitGraph,
        store: &'a dyn UnitStore,
        source: &'a dyn SourceControl,
    ) -> Self {
        Self::with_config(graph, store, source, ReconstructionConfig::default())
    }

    pub fn with_config(
        graph: &'a CommitGraph,
        store: &'a dyn UnitStore,
        source: &'a dyn SourceControl,
        config: ReconstructionConfig,
    ) -> Self {
        Self {
            graph,
            store,
            source,
            config,
            cache: ReconstructionCache::new(),
        }
    }

    pub fn cache(&self) -> &ReconstructionCache {
        &self.cache
    }

    /// Content of `path` at `target`, `None` when it cannot be found anywhere
    ///
    /// Fails only for a commit outside the graph.
    pub fn reconstruct(&self, target: &str, path: &str) -> Result<Option<Reconstruction>> {
        self.graph.commit(target)?;

        let mut step = Step::CacheCheck;
        loop {
            step = match step {
                Step::CacheCheck => match self.cached(target, path) {
                    Some(content) => {
                        return Ok(Some(Reconstruction {
                            content,
                            origin: Origin::Cache,
                            warnings: Vec::new(),
                        }));
                    }
                    None => Step::SnapshotSearch,
                },
                Step::SnapshotSearch => {
                    let mut candidates = self.snapshot_candidates(target, path)?;
                    if candidates.is_empty() {
                        tracing::debug!("No stored snapshot of {} before {}", path, target);
                        Step::Fallback
                    } else if candidates[0].sha == target {
                        Step::ExactHit(candidates.swap_remove(0))
                    } else {
                        Step::PathSearch(candidates)
                    }
                }
                Step::ExactHit(snapshot) => {
                    self.remember(target, path, &snapshot.content);
                    return Ok(Some(Reconstruction {
                        content: snapshot.content,
                        origin: Origin::Snapshot { sha: snapshot.sha },
                        warnings: Vec::new(),
                    }));
                }
                Step::PathSearch(candidates) => {
                    match self.replay_chain(target, path, candidates) {
                        Some((snapshot, path_shas)) => Step::DiffReplay(snapshot, path_shas),
                        None => {
                            tracing::debug!(
                                "No forward path from a snapshot of {} to {}",
                                path,
                                target
                            );
                            Step::Fallback
                        }
                    }
                }
                Step::DiffReplay(snapshot, path_shas) => {
                    return Ok(self.replay(target, path, snapshot, &path_shas));
                }
                Step::Fallback => return Ok(self.fallback(target, path)),
            };
        }
    }

    /// Reconstruct many (sha, path) pairs in parallel, results in request order
    pub fn reconstruct_many(
        &self,
        requests: &[(String, String)],
    ) -> Vec<Result<Option<Reconstruction>>> {
        requests
            .par_iter()
            .map(|(sha, path)| self.reconstruct(sha, path))
            .collect()
    }

    fn cached(&self, target: &str, path: &str) -> Option<String> {
        if !self.config.cache_enabled {
            return None;
        }
        self.cache.get(target, path)
    }

    fn remember(&self, target: &str, path: &str, content: &str) {
        if self.config.cache_enabled {
            self.cache.insert(target, path, content.to_string());
        }
    }

    /// File snapshots of `path` at ancestors of `target`, deepest first
    ///
    /// Ties on depth go to the lexicographically smallest sha.
    fn snapshot_candidates(&self, target: &str, path: &str) -> Result<Vec<Snapshot>> {
        let candidates = self.store.file_snapshots(path);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ancestors = self.graph.ancestors(target)?;
        let mut ranked = Vec::new();
        for snapshot in candidates {
            if ancestors.contains(&snapshot.sha) {
                ranked.push((self.graph.depth(&snapshot.sha)?, snapshot));
            }
        }
        ranked.sort_by(|(a_depth, a), (b_depth, b)| {
            (Reverse(*a_depth), &a.sha).cmp(&(Reverse(*b_depth), &b.sha))
        });
        Ok(ranked.into_iter().map(|(_, snapshot)| snapshot).collect())
    }

    /// The snapshot to replay from and the commits to replay through
    ///
    /// The first candidate whose chain is answered by stored units alone wins.
    /// Otherwise the first candidate with any forward path is used.
    fn replay_chain(
        &self,
        target: &str,
        path: &str,
        candidates: Vec<Snapshot>,
    ) -> Option<(Snapshot, Vec<String>)> {
        let mut uncovered = None;
        for snapshot in candidates {
            // Stored diffs are against first parents, so prefer that chain
            let Some(path_shas) = self
                .graph
                .first_parent_path(&snapshot.sha, target)
                .or_else(|| self.graph.path_between(&snapshot.sha, target))
            else {
                continue;
            };
            if self.covered_by_store(path, &path_shas) {
                return Some((snapshot, path_shas));
            }
            if uncovered.is_none() {
                uncovered = Some((snapshot, path_shas));
            }
        }
        uncovered
    }

    /// Whether every step of `path_shas` can be replayed without source control
    fn covered_by_store(&self, path: &str, path_shas: &[String]) -> bool {
        path_shas.windows(2).all(|pair| {
            let (prev, sha) = (pair[0].as_str(), pair[1].as_str());
            self.store.file_snapshot_at(sha, path).is_some()
                || self.store.is_removed(sha, path)
                || self.stored_step(sha, path, prev).is_some()
        })
    }

    fn replay(
        &self,
        target: &str,
        path: &str,
        snapshot: Snapshot,
        path_shas: &[String],
    ) -> Option<Reconstruction> {
        let snapshot_sha = snapshot.sha;
        let mut content = Some(snapshot.content);
        let mut warnings = Vec::new();

        for pair in path_shas.windows(2) {
            let (prev, sha) = (pair[0].as_str(), pair[1].as_str());

            if let Some(reset) = self.store.file_snapshot_at(sha, path) {
                content = Some(reset.content);
                continue;
            }
            if self.store.is_removed(sha, path) {
                content = None;
                continue;
            }

            let diff = match self.diff_for_step(sha, path, prev) {
                Ok(DiffStep::Diff(diff)) => diff,
                Ok(DiffStep::Unchanged) => continue,
                Ok(DiffStep::Absent) => {
                    content = None;
                    continue;
                }
                Err(reason) => {
                    tracing::warn!("Skipping diff of {} at {}: {}", path, sha, reason);
                    warnings.push(PatchWarning {
                        sha: sha.to_string(),
                        path: path.to_string(),
                        reason,
                    });
                    continue;
                }
            };

            let base = content.take().unwrap_or_default();
            match apply_unified_diff(&base, &diff) {
                Ok(patched) => content = Some(patched),
                Err(e) => {
                    tracing::warn!("Failed to apply diff of {} at {}: {}", path, sha, e);
                    warnings.push(PatchWarning {
                        sha: sha.to_string(),
                        path: path.to_string(),
                        reason: e.to_string(),
                    });
                    content = Some(base);
                }
            }
        }

        let content = content?;
        if warnings.is_empty() {
            self.remember(target, path, &content);
        }
        Some(Reconstruction {
            content,
            origin: Origin::Replay {
                snapshot_sha,
                steps: path_shas.len().saturating_sub(1),
            },
            warnings,
        })
    }

    /// The change of `path` from `prev` to `sha`, from the store or source control
    fn diff_for_step(
        &self,
        sha: &str,
        path: &str,
        prev: &str,
    ) -> std::result::Result<DiffStep, String> {
        if let Some(step) = self.stored_step(sha, path, prev) {
            return Ok(step);
        }
        if !self.config.live_diffs {
            return Err(format!("no stored diff against {}", prev));
        }
        match self.source.diff(sha, path, prev) {
            Ok(Some(diff)) => Ok(DiffStep::Diff(diff)),
            Ok(None) => Ok(DiffStep::Absent),
            Err(e) => Err(e.to_string()),
        }
    }

    /// The change from `prev` to `sha` as far as the store alone can tell
    fn stored_step(&self, sha: &str, path: &str, prev: &str) -> Option<DiffStep> {
        if let Some(stored) = self.store.diff_for(sha, path, prev) {
            return Some(DiffStep::Diff(stored.diff));
        }

        // Untouched markers are relative to the first parent only
        let follows_first_parent = self
            .graph
            .get(sha)
            .and_then(|commit| commit.first_parent())
            == Some(prev);
        (follows_first_parent
            && self.store.commit_record(sha).is_some()
            && !self.store.was_touched(sha, path))
        .then_some(DiffStep::Unchanged)
    }

    fn fallback(&self, target: &str, path: &str) -> Option<Reconstruction> {
        match self.source.file_content(target, path) {
            Ok(Some(content)) => {
                self.remember(target, path, &content);
                Some(Reconstruction {
                    content,
                    origin: Origin::SourceControl,
                    warnings: Vec::new(),
                })
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Cannot read {} at {} from source control: {}", path, target, e);
                None
            }
        }
    }
}

enum DiffStep {
    Diff(String),
    Unchanged,
    /// The file exists at neither commit
    Absent,
}

#[cfg(test)]
mod tests;
