// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates the wait timeout and listener, and defaults the source list to chat + presence
use crate::paths;
use anyhow::{Context, Result};
use roompoll_source::config::SourceConfig;
use roompoll_source::registry::SHARED_STORE_SOURCES;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted wait timeout (one day)
pub const MAX_WAIT_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Event sources, in fan-out order
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Room used when a poll does not name one
    #[serde(default = "default_room")]
    pub default_room: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_room: default_room(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Upper bound on every poll cycle
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
}

impl PollConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: default_wait_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    13100
}

fn default_room() -> String {
    "chatjs-room".to_string()
}

fn default_wait_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::of_type("chat"),
        SourceConfig::of_type("presence"),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            poll: PollConfig::default(),
            metrics: MetricsConfig::default(),
            sources: default_sources(),
        }
    }
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. ROOMPOLL_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/roompoll/config.toml (XDG config dir)
    pub fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("ROOMPOLL_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            tracing::warn!(path = %env_path, "ROOMPOLL_CONFIG_PATH does not exist, ignoring");
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config TOML")
    }

    /// Load configuration from a specific file without env overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    /// Searches: ROOMPOLL_CONFIG_PATH env var, ./config.toml, then ~/.config/roompoll/config.toml
    pub fn load() -> Result<Self> {
        let mut config = if let Some(config_path) = Self::find_config_file() {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            Self::from_file(&config_path)?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("ROOMPOLL_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("ROOMPOLL_PORT") {
            self.server.port = val.parse().with_context(|| {
                format!("ROOMPOLL_PORT must be a valid port number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("ROOMPOLL_DEFAULT_ROOM") {
            self.server.default_room = val;
        }
        if let Ok(val) = std::env::var("ROOMPOLL_WAIT_TIMEOUT_SECS") {
            self.poll.wait_timeout_secs = val.parse().with_context(|| {
                format!(
                    "ROOMPOLL_WAIT_TIMEOUT_SECS must be a valid number, got: {}",
                    val
                )
            })?;
        }
        Ok(())
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll.wait_timeout_secs == 0 {
            anyhow::bail!("poll.wait_timeout_secs must be greater than zero");
        }
        if self.poll.wait_timeout_secs > MAX_WAIT_TIMEOUT_SECS {
            anyhow::bail!(
                "poll.wait_timeout_secs must be at most {}, got {}",
                MAX_WAIT_TIMEOUT_SECS,
                self.poll.wait_timeout_secs
            );
        }
        if self.server.port == 0 {
            anyhow::bail!("server.port must be greater than zero");
        }
        if self.server.default_room.trim().is_empty() {
            anyhow::bail!("server.default_room cannot be empty");
        }
        let mut shared = HashSet::new();
        for source in &self.sources {
            let source_type = source.source_type();
            if source_type.trim().is_empty() {
                anyhow::bail!("every [[sources]] entry needs a non-empty type");
            }
            if SHARED_STORE_SOURCES.contains(&source_type) && !shared.insert(source_type) {
                anyhow::bail!("only one '{}' source may be configured", source_type);
            }
        }
        if self.sources.is_empty() {
            tracing::warn!("No event sources configured; every poll will wait out its timeout");
        }
        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
