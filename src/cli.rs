//! Command-line interface
//!
//! Every command opens the repository, loads its history into a [`CommitGraph`] and
//! works against the JSON unit store named by the configuration.

use crate::config::Config;
use crate::git::GitRepository;
use crate::graph::{CommitGraph, build_graph};
use crate::ingest::{IngestCheckpoint, Ingestor};
use crate::parser::TreeSitterUnitParser;
use crate::policy::{DeduplicationIndex, StoragePolicy};
use crate::reconstruct::{Origin, Reconstructor};
use crate::storage::MemoryStore;
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "history-rag")]
#[command(
    version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("GIT_COMMIT_HASH"),
        ", built ",
        env!("BUILD_TIMESTAMP"),
        ")"
    ),
    about = "Index git history as snapshots and diffs and rebuild any file at any commit",
    long_about = None
)]
pub struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true, env = "HISTORY_RAG_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Unit store file, overrides the configured location
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest the history of a repository into the store
    Ingest(IngestArgs),

    /// Print a file exactly as it was at a commit
    Reconstruct {
        /// Repository path
        repo: PathBuf,
        /// Commit (sha, branch, tag or any git revision)
        sha: String,
        /// File path relative to the repository root
        path: String,
        /// Only use stored diffs, never ask git for missing ones
        #[arg(long)]
        no_live_diffs: bool,
    },

    /// List commits parents-first
    Order {
        /// Repository path
        repo: PathBuf,
    },

    /// Show the ancestry relation and common ancestor of two commits
    Ancestry {
        /// Repository path
        repo: PathBuf,
        a: String,
        b: String,
    },

    /// List the branches whose tip contains a commit
    Branches {
        /// Repository path
        repo: PathBuf,
        sha: String,
    },
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Repository path
    pub repo: PathBuf,

    /// Changed-line fraction above which full snapshots are stored
    #[arg(long)]
    pub change_threshold: Option<f64>,

    /// Store full snapshots at every N-th commit
    #[arg(long)]
    pub snapshot_interval: Option<usize>,

    /// Only ingest paths matching these globs
    #[arg(long = "include", value_name = "GLOB")]
    pub include_patterns: Vec<String>,

    /// Skip paths matching these globs, in addition to the configured ones
    #[arg(long = "exclude", value_name = "GLOB")]
    pub exclude_patterns: Vec<String>,

    /// Ignore the checkpoint and ingest every commit again
    #[arg(long)]
    pub no_resume: bool,
}

impl Cli {
    /// Load configuration and apply command-line overrides on top
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::with_file(path)?,
            None => Config::new()?,
        };

        if let Some(store) = &self.store {
            config.paths.store_path = store.clone();
        }
        match &self.command {
            Command::Ingest(args) => {
                if let Some(threshold) = args.change_threshold {
                    config.policy.change_threshold = threshold;
                }
                if let Some(interval) = args.snapshot_interval {
                    config.policy.snapshot_interval = interval;
                }
                if !args.include_patterns.is_empty() {
                    config.ingest.include_patterns = args.include_patterns.clone();
                }
                config
                    .ingest
                    .exclude_patterns
                    .extend(args.exclude_patterns.iter().cloned());
                if args.no_resume {
                    config.ingest.resume = false;
                }
            }
            Command::Reconstruct { no_live_diffs, .. } => {
                if *no_live_diffs {
                    config.reconstruction.live_diffs = false;
                }
            }
            _ => {}
        }

        config.validate()?;
        Ok(config)
    }
}

/// Execute a parsed command line
pub fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;

    match &cli.command {
        Command::Ingest(args) => ingest(&config, args),
        Command::Reconstruct {
            repo, sha, path, ..
        } => reconstruct(&config, repo, sha, path),
        Command::Order { repo } => order(repo),
        Command::Ancestry { repo, a, b } => ancestry(repo, a, b),
        Command::Branches { repo, sha } => branches(repo, sha),
    }
}

fn open(repo: &Path) -> Result<(GitRepository, CommitGraph)> {
    let repository = GitRepository::discover(repo)?;
    let history = repository.load_history()?;
    let graph = build_graph(history.commits, history.branch_tips)
        .context("Failed to build commit graph")?;
    Ok((repository, graph))
}

fn ingest(config: &Config, args: &IngestArgs) -> Result<()> {
    let (repository, graph) = open(&args.repo)?;
    let store_path = &config.paths.store_path;
    let checkpoint_path = &config.paths.checkpoint_path;

    let store = MemoryStore::load(store_path)?;
    let policy = StoragePolicy::with_index(
        config.policy.clone(),
        DeduplicationIndex::rebuild(&store),
    );
    let parser = TreeSitterUnitParser::new();

    let mut checkpoint = if config.ingest.resume {
        IngestCheckpoint::load(checkpoint_path)?
    } else {
        IngestCheckpoint::default()
    };
    let repo_key = repository.repo_path().display().to_string();

    let stats = Ingestor::new(&graph, &repository, &parser, &store, &policy)
        .with_config(&config.ingest)?
        .run_resumable(&mut checkpoint, &repo_key)?;

    store.save(store_path)?;
    if config.ingest.resume {
        checkpoint.save(checkpoint_path)?;
    }

    println!("{}", stats);
    if stats.errors > 0 {
        tracing::warn!(
            "{} errors during ingestion; affected commits will be retried on the next run",
            stats.errors
        );
    }
    Ok(())
}

fn reconstruct(config: &Config, repo: &Path, rev: &str, path: &str) -> Result<()> {
    let (repository, graph) = open(repo)?;
    let sha = repository.resolve_commit(rev)?;
    let store = MemoryStore::load(&config.paths.store_path)?;

    let reconstructor = Reconstructor::with_config(
        &graph,
        &store,
        &repository,
        config.reconstruction.clone(),
    );
    let Some(result) = reconstructor.reconstruct(&sha, path)? else {
        bail!("'{}' does not exist at {}", path, sha);
    };

    match &result.origin {
        Origin::Cache => tracing::debug!("Served from cache"),
        Origin::Snapshot { sha } => tracing::info!("Exact snapshot at {}", sha),
        Origin::Replay {
            snapshot_sha,
            steps,
        } => tracing::info!("Replayed {} commits from snapshot at {}", steps, snapshot_sha),
        Origin::SourceControl => tracing::info!("Read directly from git"),
    }
    for warning in &result.warnings {
        tracing::warn!("{}", warning);
    }

    print!("{}", result.content);
    Ok(())
}

fn order(repo: &Path) -> Result<()> {
    let (_, graph) = open(repo)?;
    for sha in graph.topological_order()? {
        let commit = graph.commit(&sha)?;
        let date = chrono::DateTime::from_timestamp(commit.timestamp, 0)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!("{} {} {} {}", sha, date, commit.author, commit.summary());
    }
    Ok(())
}

fn ancestry(repo: &Path, a: &str, b: &str) -> Result<()> {
    let (repository, graph) = open(repo)?;
    let a = repository.resolve_commit(a)?;
    let b = repository.resolve_commit(b)?;

    println!("{} is ancestor of {}: {}", a, b, graph.is_ancestor(&a, &b));
    println!("{} is ancestor of {}: {}", b, a, graph.is_ancestor(&b, &a));
    match graph.common_ancestor(&a, &b)? {
        Some(common) => println!("common ancestor: {}", common),
        None => println!("common ancestor: none"),
    }
    Ok(())
}

fn branches(repo: &Path, rev: &str) -> Result<()> {
    let (repository, graph) = open(repo)?;
    let sha = repository.resolve_commit(rev)?;
    for branch in graph.branches_containing(&sha) {
        println!("{}", branch);
    }
    Ok(())
}
