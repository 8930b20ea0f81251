/// Platform-specific locations for the store, checkpoints and configuration
///
/// Follows the XDG Base Directory layout on Unix-like systems.
use std::path::PathBuf;

const APP_DIR: &str = "history-rag";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Get the appropriate data directory for the current platform
    ///
    /// - Windows: %LOCALAPPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_DATA_HOME or ~/.local/share
    pub fn data_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            env_dir("LOCALAPPDATA")
        } else if cfg!(target_os = "macos") {
            home_subdir("Library/Application Support")
        } else {
            std::env::var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home_subdir(".local/share"))
        }
    }

    /// Get the appropriate cache directory for the current platform
    ///
    /// - Windows: %LOCALAPPDATA%
    /// - macOS: ~/Library/Caches
    /// - Linux/Unix: $XDG_CACHE_HOME or ~/.cache
    pub fn cache_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            env_dir("LOCALAPPDATA")
        } else if cfg!(target_os = "macos") {
            home_subdir("Library/Caches")
        } else {
            std::env::var("XDG_CACHE_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home_subdir(".cache"))
        }
    }

    /// Get the appropriate config directory for the current platform
    ///
    /// - Windows: %APPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_CONFIG_HOME or ~/.config
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            env_dir("APPDATA")
        } else if cfg!(target_os = "macos") {
            home_subdir("Library/Application Support")
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| home_subdir(".config"))
        }
    }

    /// Returns: {data_dir}/history-rag
    pub fn project_data_dir() -> PathBuf {
        Self::data_dir().join(APP_DIR)
    }

    /// Returns: {cache_dir}/history-rag
    pub fn project_cache_dir() -> PathBuf {
        Self::cache_dir().join(APP_DIR)
    }

    /// Returns: {config_dir}/history-rag
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(APP_DIR)
    }

    /// Default unit store file
    ///
    /// Returns: {data_dir}/history-rag/store.json
    pub fn default_store_path() -> PathBuf {
        Self::project_data_dir().join("store.json")
    }

    /// Default ingestion checkpoint file
    ///
    /// Returns: {cache_dir}/history-rag/checkpoints.json
    pub fn default_checkpoint_path() -> PathBuf {
        Self::project_cache_dir().join("checkpoints.json")
    }

    /// Default config file
    ///
    /// Returns: {config_dir}/history-rag/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }
}

fn env_dir(var: &str) -> PathBuf {
    std::env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn home_subdir(subdir: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(subdir))
        .unwrap_or_else(|_| PathBuf::from("."))
}
