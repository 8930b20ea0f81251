//! Git repository access for history ingestion
//!
//! Loads the raw commit history and branch tips of a repository and serves file
//! contents, changed-file lists and diffs at any commit.

/// git2-backed history loading and content access
pub mod repository;

pub use repository::{GitRepository, History};
