//! Ingestion orchestrator
//!
//! Walks the commit graph parents-first, asks the [`StoragePolicy`] what to store for
//! every changed file and writes the resulting units to a [`UnitStore`]. The files of
//! one commit are planned in parallel. Deduplication and writes happen afterwards on
//! the calling thread, in path order, so the canonical copy of a repeated body does
//! not depend on scheduling and a commit's snapshots always land before the
//! references and diffs that need them.

mod checkpoint;
mod filter;

pub use checkpoint::IngestCheckpoint;
pub use filter::PathFilter;

use crate::config::IngestConfig;
use crate::error::{HistoryError, Result};
use crate::graph::CommitGraph;
use crate::policy::{StoragePlan, StoragePolicy};
use crate::source::{SourceControl, UnitKind, UnitParser};
use crate::storage::{CommitRecord, StoredUnit, UnitStore};
use rayon::prelude::*;
use std::fmt;
use std::ops::AddAssign;
use std::time::Instant;

/// Counters for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Commits processed in this run
    pub commits: usize,
    /// Commits skipped because a checkpoint already covered them
    pub resumed: usize,
    /// Changed files that produced stored units
    pub files: usize,
    pub snapshots: usize,
    pub references: usize,
    pub diffs: usize,
    /// Files deleted by their commit
    pub removed: usize,
    /// Files left out by the path filter, the size limit or for binary content
    pub skipped: usize,
    pub errors: usize,
    /// Content bytes written (snapshot bodies and diff text)
    pub stored_bytes: usize,
}

impl AddAssign for IngestStats {
    fn add_assign(&mut self, other: Self) {
        self.commits += other.commits;
        self.resumed += other.resumed;
        self.files += other.files;
        self.snapshots += other.snapshots;
        self.references += other.references;
        self.diffs += other.diffs;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.stored_bytes += other.stored_bytes;
    }
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} commits ({} resumed), {} files: {} snapshots, {} references, {} diffs, \
             {} removed, {} skipped, {} errors, {} bytes stored",
            self.commits,
            self.resumed,
            self.files,
            self.snapshots,
            self.references,
            self.diffs,
            self.removed,
            self.skipped,
            self.errors,
            self.stored_bytes
        )
    }
}

enum FileOutcome {
    Filtered,
    Oversized(usize),
    /// Binary or undecodable content
    Unsupported(String),
    Planned(StoragePlan),
    Failed(HistoryError),
}

impl FileOutcome {
    fn from_error(err: HistoryError) -> Self {
        match err {
            HistoryError::UnsupportedContent { reason, .. } => FileOutcome::Unsupported(reason),
            err => FileOutcome::Failed(err),
        }
    }
}

pub struct Ingestor<'a> {
    graph: &'a CommitGraph,
    source: &'a dyn SourceControl,
    parser: &'a dyn UnitParser,
    store: &'a dyn UnitStore,
    policy: &'a StoragePolicy,
    filter: PathFilter,
    max_file_size: usize,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        graph: &'a CommitGraph,
        source: &'a dyn SourceControl,
        parser: &'a dyn UnitParser,
        store: &'a dyn UnitStore,
        policy: &'a StoragePolicy,
    ) -> Self {
        Self {
            graph,
            source,
            parser,
            store,
            policy,
            filter: PathFilter::allow_all(),
            max_file_size: IngestConfig::default().max_file_size,
        }
    }

    /// Apply the path filter and size limit from `config`
    pub fn with_config(self, config: &IngestConfig) -> Result<Self> {
        let filter = PathFilter::from_config(config)?;
        Ok(self
            .with_filter(filter)
            .with_max_file_size(config.max_file_size))
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: usize) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Ingest every commit of the graph
    pub fn run(&self) -> Result<IngestStats> {
        self.run_resumable(&mut IngestCheckpoint::default(), "")
    }

    /// Ingest every commit not yet recorded in `checkpoint` under `repo`
    ///
    /// A commit is marked in the checkpoint only when it was ingested without errors,
    /// so failed commits are retried by the next run. Only a malformed graph aborts
    /// the run; per-commit and per-file failures are logged and counted.
    pub fn run_resumable(
        &self,
        checkpoint: &mut IngestCheckpoint,
        repo: &str,
    ) -> Result<IngestStats> {
        let start = Instant::now();
        let order = self.graph.topological_order()?;
        tracing::info!("Ingesting {} commits", order.len());

        let mut stats = IngestStats::default();
        for (index, sha) in order.iter().enumerate() {
            if checkpoint.has_commit(repo, sha) {
                stats.resumed += 1;
                continue;
            }

            let commit_stats = self.ingest_commit(sha, index);
            if commit_stats.errors == 0 {
                checkpoint.mark_commit(repo, sha);
            }
            stats += commit_stats;

            if stats.commits % 100 == 0 {
                tracing::info!("Ingested {}/{} commits", index + 1, order.len());
            }
        }

        tracing::info!("Ingestion finished in {:?}: {}", start.elapsed(), stats);
        Ok(stats)
    }

    /// Ingest a single commit at position `index` of the topological order
    pub fn ingest_commit(&self, sha: &str, index: usize) -> IngestStats {
        let mut stats = IngestStats {
            commits: 1,
            ..Default::default()
        };

        if let Err(e) = self
            .commit_record(sha)
            .and_then(|record| self.store.record_commit(record))
        {
            tracing::warn!("Failed to record commit {}: {}", sha, e);
            stats.errors += 1;
            return stats;
        }

        let mut paths = match self.source.changed_files(sha) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!("Failed to list changed files of {}: {}", sha, e);
                stats.errors += 1;
                return stats;
            }
        };
        paths.sort();
        paths.dedup();

        let outcomes: Vec<(String, FileOutcome)> = paths
            .into_par_iter()
            .map(|path| {
                let outcome = self.plan_file(sha, &path, index);
                (path, outcome)
            })
            .collect();

        let mut units = Vec::new();
        for (path, outcome) in outcomes {
            match outcome {
                FileOutcome::Filtered => stats.skipped += 1,
                FileOutcome::Oversized(len) => {
                    tracing::debug!(
                        "Skipping {} at {}: {} bytes exceeds limit of {}",
                        path,
                        sha,
                        len,
                        self.max_file_size
                    );
                    stats.skipped += 1;
                    // Later replays must not mistake the file for unchanged
                    self.touch(sha, &path, &mut stats);
                }
                FileOutcome::Unsupported(reason) => {
                    tracing::debug!("Skipping {} at {}: {}", path, sha, reason);
                    stats.skipped += 1;
                    self.touch(sha, &path, &mut stats);
                }
                FileOutcome::Failed(e) => {
                    tracing::warn!("Failed to ingest {} at {}: {}", path, sha, e);
                    stats.errors += 1;
                    self.touch(sha, &path, &mut stats);
                }
                FileOutcome::Planned(StoragePlan::Removed) => {
                    if let Err(e) = self.store.record_removal(sha, &path) {
                        tracing::warn!("Failed to record removal of {} at {}: {}", path, sha, e);
                        stats.errors += 1;
                    } else {
                        stats.removed += 1;
                    }
                }
                FileOutcome::Planned(plan) => {
                    stats.files += 1;
                    self.touch(sha, &path, &mut stats);
                    units.extend(self.policy.deduplicate(plan).into_units());
                }
            }
        }

        // Snapshots first so references within the same commit resolve
        units.sort_by_key(write_rank);
        for unit in units {
            let id = unit.id().clone();
            let bytes = unit.payload_len();
            let rank = write_rank(&unit);
            let claim = match &unit {
                StoredUnit::Snapshot(s) if s.kind != UnitKind::File => {
                    Some((s.content_hash.clone(), s.id.clone()))
                }
                _ => None,
            };
            match self.store.put(unit) {
                Ok(()) => {
                    stats.stored_bytes += bytes;
                    match rank {
                        0 => stats.snapshots += 1,
                        1 => stats.references += 1,
                        _ => stats.diffs += 1,
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to store unit {}: {}", id, e);
                    stats.errors += 1;
                    // Later duplicates must not reference a unit that was never stored
                    if let Some((hash, id)) = claim {
                        self.policy.dedup_index().release(&hash, &id);
                    }
                }
            }
        }

        tracing::debug!("Commit {}: {}", sha, stats);
        stats
    }

    fn plan_file(&self, sha: &str, path: &str, index: usize) -> FileOutcome {
        if !self.filter.matches(path) {
            return FileOutcome::Filtered;
        }
        match self.source.file_content(sha, path) {
            Ok(Some(content)) if content.len() > self.max_file_size => {
                return FileOutcome::Oversized(content.len());
            }
            Ok(_) => {}
            Err(e) => return FileOutcome::from_error(e),
        }
        match self
            .policy
            .plan_storage(self.graph, self.source, self.parser, sha, path, index)
        {
            Ok(plan) => FileOutcome::Planned(plan),
            Err(e) => FileOutcome::from_error(e),
        }
    }

    fn touch(&self, sha: &str, path: &str, stats: &mut IngestStats) {
        if let Err(e) = self.store.record_touch(sha, path) {
            tracing::warn!("Failed to record change of {} at {}: {}", path, sha, e);
            stats.errors += 1;
        }
    }

    fn commit_record(&self, sha: &str) -> Result<CommitRecord> {
        let commit = self.graph.commit(sha)?;
        Ok(CommitRecord {
            sha: commit.sha.clone(),
            parents: commit.parents.clone(),
            depth: self.graph.depth(sha)?,
            branches: self.graph.branches_containing(sha),
            is_merge: commit.is_merge(),
            author: commit.author.clone(),
            timestamp: commit.timestamp,
            message: commit.message.clone(),
            refs: commit.refs.clone(),
        })
    }
}

fn write_rank(unit: &StoredUnit) -> u8 {
    match unit {
        StoredUnit::Snapshot(_) => 0,
        StoredUnit::Reference(_) => 1,
        StoredUnit::Diff(_) => 2,
    }
}
