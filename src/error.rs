/// Centralized error types for history-rag using thiserror
///
/// The core distinguishes fatal input problems (`MalformedHistory`, `UnknownCommit`)
/// from recoverable lookup problems (`ContentUnavailable`, `PatchApplyFailure`) that
/// trigger fallback paths instead of aborting an ingestion run or a reconstruction.
use thiserror::Error;

/// Main error type for history indexing and reconstruction
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Malformed history: {0}")]
    MalformedHistory(String),

    #[error("Unknown commit: {0}")]
    UnknownCommit(String),

    #[error("Content unavailable for '{path}' at {sha}: {reason}")]
    ContentUnavailable {
        sha: String,
        path: String,
        reason: String,
    },

    /// Binary or undecodable file content that is never indexed
    #[error("Unsupported content for '{path}' at {sha}: {reason}")]
    UnsupportedContent {
        sha: String,
        path: String,
        reason: String,
    },

    #[error("Failed to apply diff for '{path}' at {sha}: {reason}")]
    PatchApplyFailure {
        sha: String,
        path: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result alias used across the core modules
pub type Result<T> = std::result::Result<T, HistoryError>;

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to git operations
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git repository not found at: {0}")]
    RepoNotFound(String),

    #[error("Failed to open git repository: {0}")]
    OpenFailed(String),

    #[error("Invalid commit hash: {0}")]
    InvalidCommitHash(String),

    #[error("Failed to read object: {0}")]
    ObjectReadFailed(String),

    #[error("Failed to diff '{path}': {reason}")]
    DiffFailed { path: String, reason: String },
}

/// Errors related to the unit store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Reference '{reference}' points to '{target}', which is not a stored snapshot")]
    DanglingReference { reference: String, target: String },

    #[error("Unit '{0}' already stored with different content")]
    Conflict(String),

    #[error("Failed to load store from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to save store to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },
}

impl From<anyhow::Error> for HistoryError {
    fn from(err: anyhow::Error) -> Self {
        HistoryError::Other(format!("{:#}", err))
    }
}

impl From<git2::Error> for HistoryError {
    fn from(err: git2::Error) -> Self {
        HistoryError::Git(GitError::ObjectReadFailed(err.message().to_string()))
    }
}

impl HistoryError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        HistoryError::Other(msg.into())
    }

    /// Shorthand for a `ContentUnavailable` error
    pub fn content_unavailable(
        sha: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        HistoryError::ContentUnavailable {
            sha: sha.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_content(
        sha: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        HistoryError::UnsupportedContent {
            sha: sha.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Recoverable errors degrade a single result instead of aborting the caller
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HistoryError::ContentUnavailable { .. }
                | HistoryError::UnsupportedContent { .. }
                | HistoryError::PatchApplyFailure { .. }
        )
    }

    /// Input errors are caused by bad history records or bad queries
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            HistoryError::MalformedHistory(_)
                | HistoryError::UnknownCommit(_)
                | HistoryError::Config(ConfigError::InvalidValue { .. })
        )
    }
}
