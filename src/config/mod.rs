/// Configuration system for history-rag
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, HistoryError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Snapshot-vs-diff storage policy
    #[serde(default)]
    pub policy: PolicyConfig,

    /// History ingestion
    #[serde(default)]
    pub ingest: IngestConfig,

    /// File reconstruction
    #[serde(default)]
    pub reconstruction: ReconstructionConfig,

    /// Store and checkpoint locations
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Storage policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Changed-line fraction above which a full snapshot is stored (0.0 to 1.0)
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f64,

    /// Every N-th commit of a run stores full snapshots
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: usize,
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum file size to ingest (in bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Only ingest paths matching one of these globs (empty = everything)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Skip paths matching any of these globs
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Skip commits recorded in the checkpoint file
    #[serde(default = "default_resume")]
    pub resume: bool,
}

/// Reconstruction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// Fetch diffs from source control when the store has none
    #[serde(default = "default_live_diffs")]
    pub live_diffs: bool,

    /// Keep rebuilt contents in memory
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
}

/// Persistence locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Unit store file
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// Ingestion checkpoint file
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
}

// Default value functions
fn default_change_threshold() -> f64 {
    0.3
}

fn default_snapshot_interval() -> usize {
    10
}

fn default_max_file_size() -> usize {
    1_048_576 // 1 MB
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "target/**".to_string(),
        "node_modules/**".to_string(),
        "dist/**".to_string(),
        "build/**".to_string(),
    ]
}

fn default_resume() -> bool {
    true
}

fn default_live_diffs() -> bool {
    true
}

fn default_cache_enabled() -> bool {
    true
}

fn default_store_path() -> PathBuf {
    crate::paths::PlatformPaths::default_store_path()
}

fn default_checkpoint_path() -> PathBuf {
    crate::paths::PlatformPaths::default_checkpoint_path()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            change_threshold: default_change_threshold(),
            snapshot_interval: default_snapshot_interval(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            include_patterns: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
            resume: default_resume(),
        }
    }
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            live_diffs: default_live_diffs(),
            cache_enabled: default_cache_enabled(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, HistoryError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, HistoryError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), HistoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), HistoryError> {
        let threshold = self.policy.change_threshold;
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(invalid(
                "policy.change_threshold",
                format!("must be between 0.0 and 1.0, got {}", threshold),
            ));
        }

        if self.policy.snapshot_interval == 0 {
            return Err(invalid(
                "policy.snapshot_interval",
                "must be greater than 0".to_string(),
            ));
        }

        if self.ingest.max_file_size == 0 {
            return Err(invalid(
                "ingest.max_file_size",
                "must be greater than 0".to_string(),
            ));
        }

        let patterns = self
            .ingest
            .include_patterns
            .iter()
            .map(|p| ("ingest.include_patterns", p))
            .chain(
                self.ingest
                    .exclude_patterns
                    .iter()
                    .map(|p| ("ingest.exclude_patterns", p)),
            );
        for (key, pattern) in patterns {
            if let Err(e) = globset::Glob::new(pattern) {
                return Err(invalid(key, format!("invalid glob '{}': {}", pattern, e)));
            }
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(threshold) = std::env::var("HISTORY_RAG_CHANGE_THRESHOLD")
            && let Ok(value) = threshold.parse()
        {
            self.policy.change_threshold = value;
        }

        if let Ok(interval) = std::env::var("HISTORY_RAG_SNAPSHOT_INTERVAL")
            && let Ok(value) = interval.parse()
        {
            self.policy.snapshot_interval = value;
        }

        if let Ok(path) = std::env::var("HISTORY_RAG_STORE_PATH") {
            self.paths.store_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("HISTORY_RAG_CHECKPOINT_PATH") {
            self.paths.checkpoint_path = PathBuf::from(path);
        }

        if let Ok(live) = std::env::var("HISTORY_RAG_LIVE_DIFFS")
            && let Some(value) = parse_bool(&live)
        {
            self.reconstruction.live_diffs = value;
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, HistoryError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::new`], but reads an explicit file instead of the default location
    pub fn with_file(path: &Path) -> Result<Self, HistoryError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

fn invalid(key: &str, reason: String) -> HistoryError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason,
    }
    .into()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
