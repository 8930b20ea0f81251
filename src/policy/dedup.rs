use crate::storage::{UnitId, UnitStore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, PoisonError};

/// Prefixes of lines treated as full-line comments during normalization
const COMMENT_PREFIXES: &[&str] = &["#", "//", "/*", "*", "*/", "--", ";;"];

/// Hash of a unit body with blank lines and full-line comments removed and every line
/// trimmed, so formatting-only edits keep the same hash
pub fn normalized_hash(body: &str) -> String {
    let normalized = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !COMMENT_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect::<Vec<_>>()
        .join("\n");
    short_hash(&normalized)
}

/// Hash of exact content, used for whole-file snapshots
pub fn raw_hash(content: &str) -> String {
    short_hash(content)
}

fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(16);
    hex
}

/// Outcome of claiming a content hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The caller's unit is now the canonical snapshot for the hash
    Claimed,
    /// Another unit already holds the hash
    Existing(UnitId),
}

/// Normalized-body hash -> canonical snapshot id
///
/// Grows during a run and shrinks only when a claimed snapshot fails to store.
/// Claims are atomic, so exactly one unit becomes canonical for a hash even when
/// several workers see the same body at once.
#[derive(Debug, Default)]
pub struct DeduplicationIndex {
    entries: Mutex<HashMap<String, UnitId>>,
}

impl DeduplicationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the index from the code-unit snapshots already in a store
    pub fn rebuild(store: &dyn UnitStore) -> Self {
        let index = Self::new();
        let snapshots = store.unit_snapshots();
        for snapshot in &snapshots {
            index.claim(&snapshot.content_hash, &snapshot.id);
        }
        tracing::debug!("Rebuilt dedup index from {} snapshots", snapshots.len());
        index
    }

    /// Register `id` as canonical for `hash` unless another unit already is
    pub fn claim(&self, hash: &str, id: &UnitId) -> Claim {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.entry(hash.to_string()) {
            Entry::Occupied(entry) => Claim::Existing(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(id.clone());
                Claim::Claimed
            }
        }
    }

    /// Remove the claim on `hash` if `id` still holds it
    pub fn release(&self, hash: &str, id: &UnitId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.entry(hash.to_string()) {
            Entry::Occupied(entry) if entry.get() == id => {
                entry.remove();
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, hash: &str) -> Option<UnitId> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hash)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
