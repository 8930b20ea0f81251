//! In-memory commit DAG
//!
//! A [`CommitGraph`] is built once per ingestion run from raw history records and is
//! read-only afterwards. Edges run from a commit to its parents; the `children` lists
//! are derived in a single pass right after the records are inserted.

mod algorithms;

use crate::error::{HistoryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// A commit record as produced by the source-control collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawCommit {
    /// Full commit SHA
    pub sha: String,
    /// Parent SHAs in recorded order (first parent first)
    #[serde(default)]
    pub parents: Vec<String>,
    /// Author name
    #[serde(default)]
    pub author: String,
    /// Commit timestamp (Unix epoch seconds)
    #[serde(default)]
    pub timestamp: i64,
    /// Full commit message
    #[serde(default)]
    pub message: String,
    /// Ref names pointing at this commit
    #[serde(default)]
    pub refs: Vec<String>,
}

impl RawCommit {
    /// Convenience constructor for a commit with only identity and parents
    pub fn new(sha: impl Into<String>, parents: &[&str]) -> Self {
        Self {
            sha: sha.into(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }
}

/// A commit inside the graph, with derived child edges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub parents: Vec<String>,
    /// Children that exist in the graph, in input order
    pub children: Vec<String>,
    pub author: String,
    pub timestamp: i64,
    pub message: String,
    pub refs: Vec<String>,
}

impl Commit {
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    /// First line of the commit message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

impl From<RawCommit> for Commit {
    fn from(raw: RawCommit) -> Self {
        Self {
            sha: raw.sha,
            parents: raw.parents,
            children: Vec::new(),
            author: raw.author,
            timestamp: raw.timestamp,
            message: raw.message,
            refs: raw.refs,
        }
    }
}

/// Immutable commit DAG plus branch tips
#[derive(Debug)]
pub struct CommitGraph {
    commits: HashMap<String, Commit>,
    /// SHAs in the order the records were supplied
    input_order: Vec<String>,
    branch_tips: BTreeMap<String, String>,
    depth_cache: RwLock<HashMap<String, usize>>,
}

/// Build a commit graph from raw history records and branch tips
///
/// Parents and tips that reference commits outside the supplied records are kept
/// as-is and treated as graph boundaries by every query.
pub fn build_graph<I, B>(raw_commits: I, branch_tips: B) -> Result<CommitGraph>
where
    I: IntoIterator<Item = RawCommit>,
    B: IntoIterator<Item = (String, String)>,
{
    let mut commits: HashMap<String, Commit> = HashMap::new();
    let mut input_order = Vec::new();

    for raw in raw_commits {
        if raw.sha.trim().is_empty() {
            return Err(HistoryError::MalformedHistory(format!(
                "commit record #{} has an empty sha",
                input_order.len()
            )));
        }
        if commits.contains_key(&raw.sha) {
            return Err(HistoryError::MalformedHistory(format!(
                "duplicate commit record {}",
                raw.sha
            )));
        }
        input_order.push(raw.sha.clone());
        commits.insert(raw.sha.clone(), Commit::from(raw));
    }

    // Children pass: the only mutation after insertion
    for sha in &input_order {
        let parents = commits[sha].parents.clone();
        for parent in parents {
            if let Some(parent_commit) = commits.get_mut(&parent) {
                parent_commit.children.push(sha.clone());
            }
        }
    }

    let graph = CommitGraph {
        commits,
        input_order,
        branch_tips: branch_tips.into_iter().collect(),
        depth_cache: RwLock::new(HashMap::new()),
    };

    let dangling = graph.dangling_parents().len();
    if dangling > 0 {
        tracing::debug!("Commit graph has {} parent references outside the graph", dangling);
    }
    tracing::info!(
        "Built commit graph with {} commits and {} branches",
        graph.len(),
        graph.branch_tips.len()
    );

    Ok(graph)
}

impl CommitGraph {
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub fn contains(&self, sha: &str) -> bool {
        self.commits.contains_key(sha)
    }

    pub fn get(&self, sha: &str) -> Option<&Commit> {
        self.commits.get(sha)
    }

    /// Look up a commit, failing with `UnknownCommit`
    pub fn commit(&self, sha: &str) -> Result<&Commit> {
        self.commits
            .get(sha)
            .ok_or_else(|| HistoryError::UnknownCommit(sha.to_string()))
    }

    /// Commits in the order their records were supplied
    pub fn commits(&self) -> impl Iterator<Item = &Commit> {
        self.input_order.iter().map(|sha| &self.commits[sha])
    }

    /// Branch name -> tip sha, sorted by branch name
    pub fn branch_tips(&self) -> &BTreeMap<String, String> {
        &self.branch_tips
    }

    pub fn tip(&self, branch: &str) -> Option<&str> {
        self.branch_tips.get(branch).map(String::as_str)
    }

    /// Parents of `sha` that exist in the graph, in recorded order
    pub fn parents_in_graph<'a>(&'a self, sha: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.commits
            .get(sha)
            .into_iter()
            .flat_map(|c| c.parents.iter())
            .filter(|p| self.commits.contains_key(p.as_str()))
            .map(String::as_str)
    }

    /// (child, parent) pairs whose parent is not in the graph
    pub fn dangling_parents(&self) -> Vec<(&str, &str)> {
        self.commits()
            .flat_map(|c| {
                c.parents
                    .iter()
                    .filter(|p| !self.commits.contains_key(p.as_str()))
                    .map(move |p| (c.sha.as_str(), p.as_str()))
            })
            .collect()
    }

    /// Branch names whose tip is not in the graph
    pub fn dangling_tips(&self) -> Vec<&str> {
        self.branch_tips
            .iter()
            .filter(|(_, tip)| !self.commits.contains_key(tip.as_str()))
            .map(|(branch, _)| branch.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests;
