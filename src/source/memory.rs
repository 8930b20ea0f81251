use super::SourceControl;
use crate::error::{HistoryError, Result};
use crate::graph::RawCommit;
use crate::patch::unified_diff;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone)]
struct Revision {
    parents: Vec<String>,
    tree: BTreeMap<String, String>,
}

/// Scripted history held in memory
///
/// Each commit records its complete file tree, so changed files and diffs are
/// derived exactly like a real repository would report them. Individual lookups can
/// be made to fail to exercise fail-safe paths.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    revisions: HashMap<String, Revision>,
    order: Vec<String>,
    failing: HashSet<(String, String)>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commit with the full set of files present at it
    pub fn commit<I, P, C>(&mut self, sha: &str, parents: &[&str], files: I) -> &mut Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let tree = files
            .into_iter()
            .map(|(path, content)| (path.into(), content.into()))
            .collect();
        self.revisions.insert(
            sha.to_string(),
            Revision {
                parents: parents.iter().map(|p| p.to_string()).collect(),
                tree,
            },
        );
        self.order.push(sha.to_string());
        self
    }

    /// Record a commit that changes some files of its first parent's tree
    ///
    /// A `None` content deletes the file.
    pub fn commit_changes(
        &mut self,
        sha: &str,
        parents: &[&str],
        changes: &[(&str, Option<&str>)],
    ) -> &mut Self {
        let mut tree = parents
            .first()
            .and_then(|p| self.revisions.get(*p))
            .map(|r| r.tree.clone())
            .unwrap_or_default();
        for (path, content) in changes {
            match content {
                Some(content) => tree.insert(path.to_string(), content.to_string()),
                None => tree.remove(*path),
            };
        }
        let files: Vec<(String, String)> = tree.into_iter().collect();
        self.commit(sha, parents, files)
    }

    /// Make every content and diff lookup of (sha, path) fail
    pub fn fail_lookups(&mut self, sha: &str, path: &str) -> &mut Self {
        self.failing.insert((sha.to_string(), path.to_string()));
        self
    }

    /// Raw commit records in the order they were added
    pub fn raw_commits(&self) -> Vec<RawCommit> {
        self.order
            .iter()
            .map(|sha| RawCommit {
                sha: sha.clone(),
                parents: self.revisions[sha].parents.clone(),
                message: format!("commit {}", sha),
                ..Default::default()
            })
            .collect()
    }

    fn revision(&self, sha: &str) -> Result<&Revision> {
        self.revisions
            .get(sha)
            .ok_or_else(|| HistoryError::UnknownCommit(sha.to_string()))
    }

    fn check_failing(&self, sha: &str, path: &str) -> Result<()> {
        if self.failing.contains(&(sha.to_string(), path.to_string())) {
            return Err(HistoryError::content_unavailable(
                sha,
                path,
                "lookup configured to fail",
            ));
        }
        Ok(())
    }
}

impl SourceControl for InMemorySource {
    fn changed_files(&self, sha: &str) -> Result<Vec<String>> {
        let revision = self.revision(sha)?;
        let empty = BTreeMap::new();
        let parent_tree = match revision.parents.first() {
            Some(parent) => &self.revision(parent)?.tree,
            None => &empty,
        };

        let paths: BTreeSet<&String> = revision.tree.keys().chain(parent_tree.keys()).collect();
        Ok(paths
            .into_iter()
            .filter(|path| revision.tree.get(*path) != parent_tree.get(*path))
            .cloned()
            .collect())
    }

    fn file_content(&self, sha: &str, path: &str) -> Result<Option<String>> {
        self.check_failing(sha, path)?;
        Ok(self.revision(sha)?.tree.get(path).cloned())
    }

    fn diff(&self, sha: &str, path: &str, against_parent: &str) -> Result<Option<String>> {
        self.check_failing(sha, path)?;
        let new = self.revision(sha)?.tree.get(path);
        let old = self.revision(against_parent)?.tree.get(path);
        if new.is_none() && old.is_none() {
            return Ok(None);
        }

        let old = old.map(String::as_str).unwrap_or("");
        let new = new.map(String::as_str).unwrap_or("");
        Ok(Some(unified_diff(old, new, path)?))
    }
}
