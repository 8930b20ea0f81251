//! Stored unit records and the persistence interface
//!
//! Every (commit, file) decision produces [`StoredUnit`]s: full snapshots, zero-content
//! references to an earlier snapshot, or a diff against the first parent. How the units
//! are persisted is the store's concern; the core only relies on unique identifiers and
//! on references resolving to a snapshot in one hop.

mod memory_store;

pub use memory_store::MemoryStore;

use crate::error::Result;
use crate::source::UnitKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a stored unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    /// `{sha}:{path}` for a whole-file snapshot
    pub fn for_file(sha: &str, path: &str) -> Self {
        Self(format!("{}:{}", sha, path))
    }

    /// `{sha}:{path}:{start_line}`, with `#{ordinal}` appended for the second and later
    /// units of the same file and commit that start on the same line
    pub fn for_unit(sha: &str, path: &str, start_line: usize, ordinal: usize) -> Self {
        if ordinal == 0 {
            Self(format!("{}:{}:{}", sha, path, start_line))
        } else {
            Self(format!("{}:{}:{}#{}", sha, path, start_line, ordinal))
        }
    }

    /// `{sha}:{path}:diff`
    pub fn for_diff(sha: &str, path: &str) -> Self {
        Self(format!("{}:{}:diff", sha, path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Full content of one code unit (or a whole file) at one commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: UnitId,
    pub sha: String,
    pub path: String,
    pub language: Option<String>,
    pub kind: UnitKind,
    pub name: String,
    /// 1-based inclusive line range; (1, line count) for files
    pub line_range: (usize, usize),
    pub content: String,
    /// Normalized-body hash for code units, raw-content hash for files
    pub content_hash: String,
}

/// A unit whose normalized body equals an already stored snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub id: UnitId,
    pub sha: String,
    pub path: String,
    pub kind: UnitKind,
    pub name: String,
    pub line_range: (usize, usize),
    pub content_hash: String,
    /// The canonical snapshot holding the body
    pub snapshot_id: UnitId,
}

/// Whether a unit name was seen on an added or a removed line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
}

/// Best-effort guess at a unit touched by a diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedUnit {
    pub name: String,
    pub change: ChangeType,
}

/// Unified diff of one file against the commit's first parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffUnit {
    pub id: UnitId,
    pub sha: String,
    pub path: String,
    pub language: Option<String>,
    pub parent_sha: String,
    pub diff: String,
    /// Heuristic: may miss units or report unrelated names
    pub changed_units: Vec<ChangedUnit>,
}

/// One stored record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoredUnit {
    Snapshot(Snapshot),
    Reference(Reference),
    Diff(DiffUnit),
}

impl StoredUnit {
    pub fn id(&self) -> &UnitId {
        match self {
            StoredUnit::Snapshot(s) => &s.id,
            StoredUnit::Reference(r) => &r.id,
            StoredUnit::Diff(d) => &d.id,
        }
    }

    pub fn sha(&self) -> &str {
        match self {
            StoredUnit::Snapshot(s) => &s.sha,
            StoredUnit::Reference(r) => &r.sha,
            StoredUnit::Diff(d) => &d.sha,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            StoredUnit::Snapshot(s) => &s.path,
            StoredUnit::Reference(r) => &r.path,
            StoredUnit::Diff(d) => &d.path,
        }
    }

    /// Stored payload size in bytes; references carry none
    pub fn payload_len(&self) -> usize {
        match self {
            StoredUnit::Snapshot(s) => s.content.len(),
            StoredUnit::Reference(_) => 0,
            StoredUnit::Diff(d) => d.diff.len(),
        }
    }
}

/// Per-commit metadata recorded alongside the units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
    pub parents: Vec<String>,
    pub depth: usize,
    pub branches: Vec<String>,
    pub is_merge: bool,
    pub author: String,
    pub timestamp: i64,
    pub message: String,
    pub refs: Vec<String>,
}

/// Persistence collaborator for stored units
///
/// Implementations must be safe to share between ingestion workers.
pub trait UnitStore: Send + Sync {
    /// Persist a unit; a `Reference` must name an already stored `Snapshot`
    fn put(&self, unit: StoredUnit) -> Result<()>;

    fn get(&self, id: &UnitId) -> Option<StoredUnit>;

    /// Whole-file snapshots stored for `path`
    fn file_snapshots(&self, path: &str) -> Vec<Snapshot>;

    /// The whole-file snapshot of `path` at `sha`, if one was stored
    fn file_snapshot_at(&self, sha: &str, path: &str) -> Option<Snapshot>;

    /// The stored diff of `path` at `sha` against `parent_sha`
    fn diff_for(&self, sha: &str, path: &str, parent_sha: &str) -> Option<DiffUnit>;

    /// Every stored code-unit snapshot (files excluded), for rebuilding dedup state
    fn unit_snapshots(&self) -> Vec<Snapshot>;

    fn record_commit(&self, record: CommitRecord) -> Result<()>;

    fn commit_record(&self, sha: &str) -> Option<CommitRecord>;

    /// Mark `path` as touched by `sha`, even when no unit was stored
    fn record_touch(&self, sha: &str, path: &str) -> Result<()>;

    fn was_touched(&self, sha: &str, path: &str) -> bool;

    /// Mark `path` as deleted at `sha`
    fn record_removal(&self, sha: &str, path: &str) -> Result<()>;

    fn is_removed(&self, sha: &str, path: &str) -> bool;

    /// Resolve a unit to the snapshot holding its content
    ///
    /// Snapshots resolve to themselves, references in exactly one hop, diffs never.
    fn resolve(&self, id: &UnitId) -> Option<Snapshot> {
        match self.get(id)? {
            StoredUnit::Snapshot(snapshot) => Some(snapshot),
            StoredUnit::Reference(reference) => match self.get(&reference.snapshot_id)? {
                StoredUnit::Snapshot(snapshot) => Some(snapshot),
                _ => None,
            },
            StoredUnit::Diff(_) => None,
        }
    }
}

#[cfg(test)]
mod tests;
