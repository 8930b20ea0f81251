//! Ordering, depth and ancestry queries over a [`CommitGraph`]
//!
//! Every traversal is iterative with an explicit worklist and visited set, so merge
//! diamonds are visited once and long histories never grow the call stack.

use super::CommitGraph;
use crate::error::{HistoryError, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::PoisonError;

impl CommitGraph {
    /// Every commit exactly once, parents before children
    ///
    /// Kahn's algorithm is seeded with the commits that have no children (the
    /// repository tips) and walks towards the roots; that tip-to-root sequence is
    /// reversed so ingestion sees a file's first snapshot before any diff built on it.
    /// Seeds are taken in sha order to keep the result deterministic.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut remaining_children: HashMap<&str, usize> = self
            .commits
            .iter()
            .map(|(sha, commit)| (sha.as_str(), commit.children.len()))
            .collect();

        let mut seeds: Vec<&str> = remaining_children
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(sha, _)| *sha)
            .collect();
        seeds.sort_unstable();

        let mut queue: VecDeque<&str> = seeds.into();
        let mut order = Vec::with_capacity(self.commits.len());

        while let Some(sha) = queue.pop_front() {
            order.push(sha.to_string());
            for parent in self.parents_in_graph(sha) {
                if let Some(count) = remaining_children.get_mut(parent) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(parent);
                    }
                }
            }
        }

        if order.len() != self.commits.len() {
            return Err(HistoryError::MalformedHistory(format!(
                "commit graph contains a cycle: ordered {} of {} commits",
                order.len(),
                self.commits.len()
            )));
        }

        order.reverse();
        Ok(order)
    }

    /// Distance from the furthest in-graph root
    ///
    /// 0 for a commit without in-graph parents, otherwise one more than its deepest
    /// parent. Results are memoized in the graph for all later queries.
    pub fn depth(&self, sha: &str) -> Result<usize> {
        if !self.contains(sha) {
            return Err(HistoryError::UnknownCommit(sha.to_string()));
        }
        if let Some(depth) = self.cached_depth(sha) {
            return Ok(depth);
        }

        let mut computed: HashMap<String, usize> = HashMap::new();
        let mut in_progress: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![sha];

        while let Some(&current) = stack.last() {
            if computed.contains_key(current) {
                stack.pop();
                continue;
            }
            in_progress.insert(current);

            let mut pending = Vec::new();
            let mut max_parent: Option<usize> = None;
            for parent in self.parents_in_graph(current) {
                let known = computed
                    .get(parent)
                    .copied()
                    .or_else(|| self.cached_depth(parent));
                match known {
                    Some(d) => max_parent = Some(max_parent.map_or(d, |m| m.max(d))),
                    None if in_progress.contains(parent) => {
                        return Err(HistoryError::MalformedHistory(format!(
                            "cycle detected at commit {}",
                            parent
                        )));
                    }
                    None => pending.push(parent),
                }
            }

            if pending.is_empty() {
                let depth = max_parent.map_or(0, |m| m + 1);
                computed.insert(current.to_string(), depth);
                in_progress.remove(current);
                stack.pop();
            } else {
                stack.extend(pending);
            }
        }

        let depth = computed[sha];
        self.depth_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(computed);
        Ok(depth)
    }

    fn cached_depth(&self, sha: &str) -> Option<usize> {
        self.depth_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sha)
            .copied()
    }

    /// True iff `ancestor == sha` or `ancestor` is reachable from `sha` via parents
    ///
    /// Shas outside the graph are boundaries: they are never expanded, and an unknown
    /// `sha` only matches itself.
    pub fn is_ancestor(&self, ancestor: &str, sha: &str) -> bool {
        if ancestor == sha {
            return true;
        }
        if !self.contains(ancestor) {
            return false;
        }

        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(sha);
        visited.insert(sha);

        while let Some(current) = queue.pop_front() {
            for parent in self.parents_in_graph(current) {
                if parent == ancestor {
                    return true;
                }
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        false
    }

    /// All in-graph ancestors of `sha`, including `sha` itself
    pub fn ancestors(&self, sha: &str) -> Result<HashSet<String>> {
        if !self.contains(sha) {
            return Err(HistoryError::UnknownCommit(sha.to_string()));
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut stack = vec![sha];
        visited.insert(sha.to_string());

        while let Some(current) = stack.pop() {
            for parent in self.parents_in_graph(current) {
                if visited.insert(parent.to_string()) {
                    stack.push(parent);
                }
            }
        }
        Ok(visited)
    }

    /// Most recent common ancestor of two commits
    ///
    /// Among the shared ancestors the deepest one wins; equal depths are broken by
    /// picking the lexicographically smallest sha.
    pub fn common_ancestor(&self, a: &str, b: &str) -> Result<Option<String>> {
        let ancestors_a = self.ancestors(a)?;
        let ancestors_b = self.ancestors(b)?;

        let mut best: Option<(usize, &String)> = None;
        for sha in ancestors_a.intersection(&ancestors_b) {
            let depth = self.depth(sha)?;
            best = match best {
                Some((best_depth, best_sha))
                    if best_depth > depth || (best_depth == depth && best_sha < sha) =>
                {
                    Some((best_depth, best_sha))
                }
                _ => Some((depth, sha)),
            };
        }

        Ok(best.map(|(_, sha)| sha.clone()))
    }

    /// Branch names whose tip contains `sha`, sorted by name
    pub fn branches_containing(&self, sha: &str) -> Vec<String> {
        self.branch_tips
            .iter()
            .filter(|(_, tip)| self.is_ancestor(sha, tip))
            .map(|(branch, _)| branch.clone())
            .collect()
    }

    /// Path from `start` to `end` following only first-parent edges, both inclusive
    ///
    /// `None` when `start` is not on the first-parent chain of `end`.
    pub fn first_parent_path(&self, start: &str, end: &str) -> Option<Vec<String>> {
        let mut path = vec![self.get(end)?.sha.clone()];
        let mut cursor = self.get(end)?;
        while cursor.sha != start {
            let parent = cursor.first_parent()?;
            cursor = self.get(parent)?;
            path.push(cursor.sha.clone());
        }
        path.reverse();
        Some(path)
    }

    /// Shortest forward path from `start` to `end` over child edges, both inclusive
    pub fn path_between(&self, start: &str, end: &str) -> Option<Vec<String>> {
        if start == end {
            return self.contains(start).then(|| vec![start.to_string()]);
        }

        let mut came_from: HashMap<&str, &str> = HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(self.get(start)?.sha.as_str());

        while let Some(current) = queue.pop_front() {
            let Some(commit) = self.get(current) else {
                continue;
            };
            for child in &commit.children {
                let child = child.as_str();
                if child == start || came_from.contains_key(child) {
                    continue;
                }
                came_from.insert(child, current);
                if child == end {
                    let mut path = vec![end.to_string()];
                    let mut cursor = end;
                    while let Some(&previous) = came_from.get(cursor) {
                        path.push(previous.to_string());
                        cursor = previous;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(child);
            }
        }
        None
    }
}
