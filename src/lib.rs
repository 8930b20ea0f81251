//! # History RAG - Commit-Graph Aware History Indexing
//!
//! Indexes the full history of a repository as a mix of full snapshots and
//! incremental diffs, deduplicates identical code units across commits and
//! reconstructs any file at any commit exactly.
//!
//! ## Overview
//!
//! Ingestion walks the commit graph parents-first. For every changed file the storage
//! policy decides between a full snapshot (roots, merges, periodic checkpoints, new
//! files, large changes) and a unified diff against the first parent. Code units with a
//! normalized body that was already stored become zero-content references.
//!
//! Reconstruction finds the nearest ancestor holding a file snapshot, replays the diffs
//! along the forward path to the target commit and falls back to git when the store
//! cannot answer.
//!
//! ## Key Features
//!
//! - **Commit graph**: topological order, depth, ancestry, common ancestors, branch
//!   membership and forward path search over the history DAG
//! - **Snapshot/diff policy**: configurable change threshold and snapshot interval
//! - **Deduplication**: whitespace- and comment-insensitive content hashes per code unit
//! - **AST units**: Tree-sitter parsing for 12 programming languages
//! - **Lossless reconstruction**: diff replay with caching and git fallback
//! - **Resumable ingestion**: per-repository checkpoints of finished commits
//!
//! ## Architecture
//!
//! ```text
//! git2 history ──► CommitGraph ──► Ingestor ──► StoragePolicy ──► UnitStore
//!                       │                            │               │
//!                       │                   DeduplicationIndex       │
//!                       └────────────► Reconstructor ◄───────────────┘
//!                                           │
//!                                  ReconstructionCache
//! ```
//!
//! ## Modules
//!
//! - [`graph`]: Commit DAG construction and graph algorithms
//! - [`policy`]: Snapshot vs diff decisions and content-hash deduplication
//! - [`reconstruct`]: File reconstruction by diff replay
//! - [`ingest`]: Ingestion orchestrator, path filtering and checkpoints
//! - [`storage`]: Stored unit records, store trait and JSON-backed store
//! - [`git`]: git2-backed history and content access
//! - [`parser`]: Tree-sitter code unit extraction
//! - [`patch`]: Unified diff generation and application
//! - [`source`]: Source-control and parser collaborator traits
//! - [`config`]: Configuration management with environment variable support
//! - [`error`]: Error types and result aliases
//! - [`paths`]: Platform directories
//!
//! ## Usage Example
//!
//! ```no_run
//! use history_rag::git::GitRepository;
//! use history_rag::graph::build_graph;
//! use history_rag::reconstruct::Reconstructor;
//! use history_rag::storage::MemoryStore;
//!
//! fn main() -> anyhow::Result<()> {
//!     let repo = GitRepository::discover(".")?;
//!     let history = repo.load_history()?;
//!     let graph = build_graph(history.commits, history.branch_tips)?;
//!     let store = MemoryStore::new();
//!
//!     let head = repo.resolve_commit("HEAD")?;
//!     let reconstructor = Reconstructor::new(&graph, &store, &repo);
//!     if let Some(result) = reconstructor.reconstruct(&head, "Cargo.toml")? {
//!         print!("{}", result.content);
//!     }
//!     Ok(())
//! }
//! ```

/// Command-line interface definitions and command execution
pub mod cli;

/// Configuration management with environment variable overrides
pub mod config;

/// Error types and utilities
pub mod error;

/// Git repository access: history loading, contents and diffs
pub mod git;

/// Commit graph construction and algorithms
pub mod graph;

/// Ingestion orchestration
pub mod ingest;

/// Tree-sitter based code unit parsing
pub mod parser;

/// Unified diff generation and application
pub mod patch;

/// Platform-specific directories
pub mod paths;

/// Snapshot vs diff storage policy and deduplication
pub mod policy;

/// File reconstruction at arbitrary commits
pub mod reconstruct;

/// Collaborator traits for source control and unit parsing
pub mod source;

/// Stored units and the unit store
pub mod storage;
