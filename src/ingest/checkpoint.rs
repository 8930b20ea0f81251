use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Commits already ingested, per repository, so an interrupted run can resume
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestCheckpoint {
    /// Map of repository path -> set of fully ingested commit shas
    pub repos: HashMap<String, HashSet<String>>,
}

impl IngestCheckpoint {
    /// Get the default checkpoint file path
    pub fn default_path() -> PathBuf {
        crate::paths::PlatformPaths::default_checkpoint_path()
    }

    /// Load checkpoints from disk, starting empty when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Checkpoint file not found, starting from scratch");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read checkpoint file")?;
        let checkpoint: IngestCheckpoint =
            serde_json::from_str(&content).context("Failed to parse checkpoint file")?;

        tracing::info!(
            "Loaded checkpoint with {} ingested commits across {} repositories",
            checkpoint.total_commits(),
            checkpoint.repos.len()
        );
        Ok(checkpoint)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create checkpoint directory")?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize checkpoint")?;
        fs::write(path, content).context("Failed to write checkpoint file")?;

        tracing::debug!("Saved checkpoint to {:?}", path);
        Ok(())
    }

    pub fn has_commit(&self, repo: &str, sha: &str) -> bool {
        self.repos
            .get(repo)
            .map(|commits| commits.contains(sha))
            .unwrap_or(false)
    }

    pub fn commit_count(&self, repo: &str) -> usize {
        self.repos.get(repo).map(HashSet::len).unwrap_or(0)
    }

    pub fn mark_commit(&mut self, repo: &str, sha: &str) {
        self.repos
            .entry(repo.to_string())
            .or_default()
            .insert(sha.to_string());
    }

    /// Forget a repository, forcing the next run to start over
    pub fn remove_repo(&mut self, repo: &str) -> bool {
        self.repos.remove(repo).is_some()
    }

    pub fn total_commits(&self) -> usize {
        self.repos.values().map(HashSet::len).sum()
    }
}
