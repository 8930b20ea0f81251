//! Include/exclude glob filtering of changed paths

use crate::config::IngestConfig;
use crate::error::{ConfigError, Result};
use globset::{Glob, GlobMatcher};

/// Compiled include and exclude patterns
///
/// A path passes when it matches any include pattern (or no include patterns are
/// configured) and no exclude pattern. Patterns are tried against the whole path and
/// against every suffix starting at a directory boundary, so `target/**` also
/// excludes `crates/core/target/debug/build.rs`.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Vec<GlobMatcher>,
    exclude: Vec<GlobMatcher>,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile_patterns("ingest.include_patterns", include)?,
            exclude: compile_patterns("ingest.exclude_patterns", exclude)?,
        })
    }

    /// A filter that lets every path through
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        Self::new(&config.include_patterns, &config.exclude_patterns)
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        if !self.include.is_empty() && !matches_any(&self.include, path) {
            return false;
        }
        !matches_any(&self.exclude, path)
    }
}

fn compile_patterns(key: &str, patterns: &[String]) -> Result<Vec<GlobMatcher>> {
    patterns
        .iter()
        .map(|pattern| {
            Glob::new(pattern)
                .map(|glob| glob.compile_matcher())
                .map_err(|e| {
                    ConfigError::InvalidValue {
                        key: key.to_string(),
                        reason: format!("invalid glob '{}': {}", pattern, e),
                    }
                    .into()
                })
        })
        .collect()
}

fn matches_any(matchers: &[GlobMatcher], path: &str) -> bool {
    matchers.iter().any(|matcher| {
        if matcher.is_match(path) {
            return true;
        }
        let parts: Vec<&str> = path.split('/').collect();
        (1..parts.len()).any(|i| matcher.is_match(parts[i..].join("/")))
    })
}
