//! Configuration management
//!
//! Manages server, storage, progression chain, polling client and session
//! launcher settings, stored as TOML in the platform config directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ProgressError;
use crate::types::{GoalConfig, DEFAULT_THRESHOLD, DEFAULT_WINDOW_SIZE};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Database location
    #[serde(default)]
    pub storage: StorageConfig,
    /// Character chain and default goals
    #[serde(default)]
    pub progression: ProgressionConfig,
    /// Polling client settings
    #[serde(default)]
    pub poller: PollerConfig,
    /// Outbound session launch URLs
    #[serde(default)]
    pub launcher: LauncherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins of the embedding host pages; empty allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Upper bound on handling a single request
    #[serde(default = "default_server_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_server_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: vec![],
            request_timeout_secs: default_server_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    data_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("progress.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// Ordered characters; the first is always unlocked
    #[serde(default = "default_chain")]
    pub chain: Vec<String>,
    /// Window size used when a team has no goals of its own
    #[serde(default = "default_window_size")]
    pub default_window_size: u32,
    /// Threshold used when a team has no goals of its own
    #[serde(default = "default_threshold")]
    pub default_threshold: u32,
}

fn default_chain() -> Vec<String> {
    vec!["Megan".to_string(), "David".to_string(), "Linda".to_string()]
}

fn default_window_size() -> u32 {
    DEFAULT_WINDOW_SIZE
}

fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            chain: default_chain(),
            default_window_size: default_window_size(),
            default_threshold: default_threshold(),
        }
    }
}

impl ProgressionConfig {
    /// Goals applied to learners without a team row
    pub fn default_goals(&self) -> GoalConfig {
        GoalConfig {
            window_size: self.default_window_size,
            threshold: self.default_threshold,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Base URL of the progress server
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Seconds between poll ticks
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Timeout for each backend call within a tick
    #[serde(default = "default_client_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    format!("http://{}:{}", default_host(), default_port())
}

fn default_interval() -> u64 {
    5
}

fn default_client_timeout() -> u64 {
    4
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            interval_secs: default_interval(),
            request_timeout_secs: default_client_timeout(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Character -> external session launcher URL
    #[serde(default)]
    pub urls: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load from an explicit path, writing defaults there if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Reject settings the progression engine cannot run with
    pub fn validate(&self) -> crate::error::Result<()> {
        let chain = &self.progression.chain;
        if chain.is_empty() {
            return Err(ProgressError::Config("progression.chain must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for character in chain {
            if character.trim().is_empty() {
                return Err(ProgressError::Config("progression.chain contains a blank character".into()));
            }
            if !seen.insert(character.as_str()) {
                return Err(ProgressError::Config(format!(
                    "progression.chain lists '{}' more than once",
                    character
                )));
            }
        }

        self.progression
            .default_goals()
            .validate()
            .map_err(|e| ProgressError::Config(format!("progression defaults: {}", e)))?;

        if self.poller.interval_secs == 0 {
            return Err(ProgressError::Config("poller.interval_secs must be positive".into()));
        }
        if self.poller.request_timeout_secs == 0 || self.server.request_timeout_secs == 0 {
            return Err(ProgressError::Config("request timeouts must be positive".into()));
        }

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "practice-progress", "practice-progress")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "practice-progress", "practice-progress")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}

/// Print the effective configuration
pub fn show_config(config: &Config) {
    println!("Server:      {}:{}", config.server.host, config.server.port);
    if config.server.allowed_origins.is_empty() {
        println!("  Origins:   any");
    } else {
        println!("  Origins:   {}", config.server.allowed_origins.join(", "));
    }
    println!("Database:    {}", config.storage.database_path.display());
    println!("Chain:       {}", config.progression.chain.join(" -> "));
    println!(
        "Defaults:    last {} sessions, threshold {}",
        config.progression.default_window_size, config.progression.default_threshold
    );
    println!(
        "Poller:      {} every {}s (timeout {}s)",
        config.poller.base_url, config.poller.interval_secs, config.poller.request_timeout_secs
    );
    for (character, url) in &config.launcher.urls {
        println!("Launcher:    {} -> {}", character, url);
    }
}

/// Get default configuration as TOML string
pub fn default_config_toml() -> String {
    let config = Config::default();
    toml::to_string_pretty(&config).unwrap_or_else(|_| "# Default configuration\n".to_string())
}
