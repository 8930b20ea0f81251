use super::{CommitRecord, DiffUnit, Snapshot, StoredUnit, UnitId, UnitStore};
use crate::error::{Result, StoreError};
use crate::source::UnitKind;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    units: BTreeMap<UnitId, StoredUnit>,
    commits: BTreeMap<String, CommitRecord>,
    touched: BTreeSet<(String, String)>,
    removed: BTreeSet<(String, String)>,

    /// path -> whole-file snapshot ids
    #[serde(skip)]
    file_snapshots: HashMap<String, Vec<UnitId>>,
    /// (sha, path, parent sha) -> diff id
    #[serde(skip)]
    diffs: HashMap<(String, String, String), UnitId>,
}

impl StoreData {
    fn index(&mut self, unit: &StoredUnit) {
        match unit {
            StoredUnit::Snapshot(s) if s.kind == UnitKind::File => {
                self.file_snapshots
                    .entry(s.path.clone())
                    .or_default()
                    .push(s.id.clone());
            }
            StoredUnit::Diff(d) => {
                self.diffs.insert(
                    (d.sha.clone(), d.path.clone(), d.parent_sha.clone()),
                    d.id.clone(),
                );
            }
            _ => {}
        }
    }

    fn rebuild_indexes(&mut self) {
        let units: Vec<StoredUnit> = self.units.values().cloned().collect();
        for unit in &units {
            self.index(unit);
        }
    }
}

/// In-memory unit store with JSON persistence
///
/// Reads and writes go through one `RwLock`; the store can be shared between
/// ingestion workers and reconstruction threads.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from disk, or start empty if the file does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("Store file not found, starting with an empty store");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read store file")?;
        let mut data: StoreData =
            serde_json::from_str(&content).context("Failed to parse store file")?;
        data.rebuild_indexes();

        tracing::info!(
            "Loaded store with {} units across {} commits",
            data.units.len(),
            data.commits.len()
        );
        Ok(Self {
            data: RwLock::new(data),
        })
    }

    /// Save the store to disk
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let content = {
            let data = self.read();
            serde_json::to_string(&*data).context("Failed to serialize store")?
        };
        fs::write(path, content).context("Failed to write store file")?;

        tracing::debug!("Saved store to {:?}", path);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.read().units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().units.is_empty()
    }

    /// Counts of (snapshots, references, diffs)
    pub fn counts(&self) -> (usize, usize, usize) {
        let data = self.read();
        data.units
            .values()
            .fold((0, 0, 0), |(s, r, d), unit| match unit {
                StoredUnit::Snapshot(_) => (s + 1, r, d),
                StoredUnit::Reference(_) => (s, r + 1, d),
                StoredUnit::Diff(_) => (s, r, d + 1),
            })
    }

    /// Total stored payload bytes
    pub fn payload_bytes(&self) -> usize {
        self.read().units.values().map(StoredUnit::payload_len).sum()
    }

    /// Every unit stored for a commit
    pub fn units_at(&self, sha: &str) -> Vec<StoredUnit> {
        self.read()
            .units
            .values()
            .filter(|u| u.sha() == sha)
            .cloned()
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl UnitStore for MemoryStore {
    fn put(&self, unit: StoredUnit) -> Result<()> {
        let mut data = self.write();

        if let StoredUnit::Reference(reference) = &unit {
            match data.units.get(&reference.snapshot_id) {
                Some(StoredUnit::Snapshot(_)) => {}
                _ => {
                    return Err(StoreError::DanglingReference {
                        reference: reference.id.to_string(),
                        target: reference.snapshot_id.to_string(),
                    }
                    .into());
                }
            }
        }

        if let Some(existing) = data.units.get(unit.id()) {
            if *existing == unit {
                return Ok(());
            }
            return Err(StoreError::Conflict(unit.id().to_string()).into());
        }

        data.index(&unit);
        data.touched
            .insert((unit.sha().to_string(), unit.path().to_string()));
        data.units.insert(unit.id().clone(), unit);
        Ok(())
    }

    fn get(&self, id: &UnitId) -> Option<StoredUnit> {
        self.read().units.get(id).cloned()
    }

    fn file_snapshots(&self, path: &str) -> Vec<Snapshot> {
        let data = self.read();
        data.file_snapshots
            .get(path)
            .into_iter()
            .flatten()
            .filter_map(|id| match data.units.get(id) {
                Some(StoredUnit::Snapshot(s)) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    fn file_snapshot_at(&self, sha: &str, path: &str) -> Option<Snapshot> {
        match self.read().units.get(&UnitId::for_file(sha, path)) {
            Some(StoredUnit::Snapshot(s)) if s.kind == UnitKind::File => Some(s.clone()),
            _ => None,
        }
    }

    fn diff_for(&self, sha: &str, path: &str, parent_sha: &str) -> Option<DiffUnit> {
        let data = self.read();
        let key = (sha.to_string(), path.to_string(), parent_sha.to_string());
        match data.diffs.get(&key).and_then(|id| data.units.get(id)) {
            Some(StoredUnit::Diff(d)) => Some(d.clone()),
            _ => None,
        }
    }

    fn unit_snapshots(&self) -> Vec<Snapshot> {
        self.read()
            .units
            .values()
            .filter_map(|unit| match unit {
                StoredUnit::Snapshot(s) if s.kind != UnitKind::File => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    fn record_commit(&self, record: CommitRecord) -> Result<()> {
        self.write().commits.insert(record.sha.clone(), record);
        Ok(())
    }

    fn commit_record(&self, sha: &str) -> Option<CommitRecord> {
        self.read().commits.get(sha).cloned()
    }

    fn record_touch(&self, sha: &str, path: &str) -> Result<()> {
        self.write()
            .touched
            .insert((sha.to_string(), path.to_string()));
        Ok(())
    }

    fn was_touched(&self, sha: &str, path: &str) -> bool {
        self.read()
            .touched
            .contains(&(sha.to_string(), path.to_string()))
    }

    fn record_removal(&self, sha: &str, path: &str) -> Result<()> {
        let mut data = self.write();
        data.removed.insert((sha.to_string(), path.to_string()));
        data.touched.insert((sha.to_string(), path.to_string()));
        Ok(())
    }

    fn is_removed(&self, sha: &str, path: &str) -> bool {
        self.read()
            .removed
            .contains(&(sha.to_string(), path.to_string()))
    }
}
