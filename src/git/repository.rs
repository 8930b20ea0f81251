use crate::error::{GitError, HistoryError};
use crate::graph::RawCommit;
use crate::patch::unified_diff;
use crate::source::SourceControl;
use anyhow::{Context, Result};
use git2::{BranchType, ErrorCode, ObjectType, Oid, Repository, Sort};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Raw history of a repository, ready for `build_graph`
#[derive(Debug, Clone, Default)]
pub struct History {
    /// Commits reachable from any branch or HEAD, newest first
    pub commits: Vec<RawCommit>,
    /// (branch name, tip sha); remote branches are prefixed with their remote
    pub branch_tips: Vec<(String, String)>,
}

/// A git repository as history source and content source
///
/// `git2::Repository` is not `Sync`; access is serialized through a mutex so one
/// instance can serve parallel ingestion workers.
pub struct GitRepository {
    repo: Mutex<Repository>,
    repo_path: PathBuf,
}

impl GitRepository {
    /// Discover and open a git repository from any path within it
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let discovered = Repository::discover(path).with_context(|| {
            GitError::RepoNotFound(path.display().to_string()).to_string()
        })?;
        let repo_path = discovered
            .workdir()
            .unwrap_or_else(|| discovered.path())
            .to_path_buf();

        tracing::info!("Opened git repository at: {}", repo_path.display());

        Ok(Self {
            repo: Mutex::new(discovered),
            repo_path,
        })
    }

    /// Get the repository root path
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Get the current branch name, or None if detached HEAD
    pub fn current_branch(&self) -> Option<String> {
        let repo = self.lock();
        let head = repo.head().ok()?;
        if !head.is_branch() {
            return None;
        }
        head.shorthand().map(|s| s.to_string())
    }

    /// Check if repository has any commits
    pub fn has_commits(&self) -> bool {
        self.lock().head().is_ok()
    }

    /// Resolve a revision (full or abbreviated sha, branch, tag, `HEAD~2`) to a full sha
    pub fn resolve_commit(&self, rev: &str) -> crate::error::Result<String> {
        let repo = self.lock();
        let commit = repo
            .revparse_single(rev)
            .and_then(|object| object.peel_to_commit())
            .map_err(|_| HistoryError::UnknownCommit(rev.to_string()))?;
        Ok(commit.id().to_string())
    }

    /// Load every commit reachable from a branch or HEAD plus all branch tips
    pub fn load_history(&self) -> Result<History> {
        let repo = self.lock();
        let branch_tips = Self::branch_tips(&repo)?;

        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        let mut pushed = 0;
        for (name, sha) in &branch_tips {
            let oid = Oid::from_str(sha).with_context(|| format!("Invalid tip of {}", name))?;
            revwalk.push(oid)?;
            pushed += 1;
        }
        // Detached HEAD may point outside every branch
        if let Ok(head) = repo.head()
            && let Some(oid) = head.target()
        {
            revwalk.push(oid)?;
            pushed += 1;
        }
        if pushed == 0 {
            tracing::info!("Repository has no commits");
            return Ok(History::default());
        }

        let refs = Self::refs_by_commit(&repo)?;
        let mut commits = Vec::new();
        for oid in revwalk {
            let commit = repo.find_commit(oid?)?;
            let sha = commit.id().to_string();
            let author = commit.author();
            commits.push(RawCommit {
                parents: commit.parent_ids().map(|p| p.to_string()).collect(),
                author: author.name().unwrap_or("Unknown").to_string(),
                timestamp: commit.time().seconds(),
                message: commit.message().unwrap_or("").to_string(),
                refs: refs.get(&sha).cloned().unwrap_or_default(),
                sha,
            });

            if commits.len() % 500 == 0 {
                tracing::debug!("Loaded {} commits", commits.len());
            }
        }

        tracing::info!(
            "Loaded {} commits and {} branches from {}",
            commits.len(),
            branch_tips.len(),
            self.repo_path.display()
        );
        Ok(History {
            commits,
            branch_tips,
        })
    }

    fn branch_tips(repo: &Repository) -> Result<Vec<(String, String)>> {
        let mut tips = Vec::new();
        for branch in repo.branches(None)? {
            let (branch, kind) = branch?;
            let Some(name) = branch.name()?.map(str::to_string) else {
                continue;
            };
            // Symbolic refs such as origin/HEAD have no direct target
            let Some(target) = branch.get().target() else {
                continue;
            };
            if kind == BranchType::Remote && name.ends_with("/HEAD") {
                continue;
            }
            tips.push((name, target.to_string()));
        }
        tips.sort();
        Ok(tips)
    }

    fn refs_by_commit(repo: &Repository) -> Result<HashMap<String, Vec<String>>> {
        let mut refs: HashMap<String, Vec<String>> = HashMap::new();
        for reference in repo.references()? {
            let reference = reference?;
            let Some(name) = reference.shorthand().map(str::to_string) else {
                continue;
            };
            if let Ok(commit) = reference.peel_to_commit() {
                refs.entry(commit.id().to_string()).or_default().push(name);
            }
        }
        for names in refs.values_mut() {
            names.sort();
        }
        Ok(refs)
    }

    fn lock(&self) -> MutexGuard<'_, Repository> {
        self.repo.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn find_commit<'r>(
        repo: &'r Repository,
        sha: &str,
    ) -> crate::error::Result<git2::Commit<'r>> {
        let oid =
            Oid::from_str(sha).map_err(|_| GitError::InvalidCommitHash(sha.to_string()))?;
        repo.find_commit(oid)
            .map_err(|_| HistoryError::UnknownCommit(sha.to_string()))
    }

    fn read_file(
        repo: &Repository,
        sha: &str,
        path: &str,
    ) -> crate::error::Result<Option<String>> {
        let tree = Self::find_commit(repo, sha)?.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }

        let object = entry.to_object(repo)?;
        let Some(blob) = object.as_blob() else {
            return Ok(None);
        };
        if blob.is_binary() {
            return Err(HistoryError::unsupported_content(sha, path, "binary content"));
        }
        match std::str::from_utf8(blob.content()) {
            Ok(content) => Ok(Some(content.to_string())),
            Err(_) => Err(HistoryError::unsupported_content(
                sha,
                path,
                "content is not valid UTF-8",
            )),
        }
    }
}

impl SourceControl for GitRepository {
    fn changed_files(&self, sha: &str) -> crate::error::Result<Vec<String>> {
        let repo = self.lock();
        let commit = Self::find_commit(&repo, sha)?;
        let tree = commit.tree()?;

        let parent_tree = if commit.parent_count() > 0 {
            Some(commit.parent(0)?.tree()?)
        } else {
            None
        };

        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
        let paths: BTreeSet<String> = diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        Ok(paths.into_iter().collect())
    }

    fn file_content(&self, sha: &str, path: &str) -> crate::error::Result<Option<String>> {
        let repo = self.lock();
        Self::read_file(&repo, sha, path)
    }

    fn diff(
        &self,
        sha: &str,
        path: &str,
        against_parent: &str,
    ) -> crate::error::Result<Option<String>> {
        let (new, old) = {
            let repo = self.lock();
            (
                Self::read_file(&repo, sha, path)?,
                Self::read_file(&repo, against_parent, path)?,
            )
        };
        if new.is_none() && old.is_none() {
            return Ok(None);
        }

        let diff = unified_diff(
            old.as_deref().unwrap_or(""),
            new.as_deref().unwrap_or(""),
            path,
        )
        .map_err(|e| GitError::DiffFailed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(diff))
    }
}

