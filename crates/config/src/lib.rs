//! Configuration loading, validation, and management for mnemo.
//!
//! Loads configuration from `~/.mnemo/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.mnemo/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the OpenAI-compatible endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Chat model used for the agent, compaction and titles
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used to embed notes and queries
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Where the database and vector collections live.
    /// Defaults to `~/.mnemo/data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// Agent loop and compaction tuning
    #[serde(default)]
    pub agent: AgentConfig,

    /// Session / note storage
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_api_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "openai/text-embedding-3-small".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("data_dir", &self.data_dir)
            .field("agent", &self.agent)
            .field("store", &self.store)
            .field("gateway", &self.gateway)
            .finish()
    }
}

/// `[agent]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on LLM round-trips per chat turn
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Total history size, in characters, above which compaction fires
    #[serde(default = "default_compact_threshold")]
    pub compact_threshold_chars: usize,

    /// Messages kept verbatim after compaction
    #[serde(default = "default_keep_recent")]
    pub keep_recent_messages: usize,

    /// Pause between simulated answer tokens
    #[serde(default = "default_token_delay_ms")]
    pub token_delay_ms: u64,

    /// Citations surfaced alongside each answer
    #[serde(default = "default_source_count")]
    pub source_count: usize,

    /// Also persist tool results as `tool` messages
    #[serde(default)]
    pub persist_tool_messages: bool,
}

fn default_max_rounds() -> usize {
    6
}
fn default_compact_threshold() -> usize {
    // ~100k tokens at four characters per token
    400_000
}
fn default_keep_recent() -> usize {
    10
}
fn default_token_delay_ms() -> u64 {
    8
}
fn default_source_count() -> usize {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            compact_threshold_chars: default_compact_threshold(),
            keep_recent_messages: default_keep_recent(),
            token_delay_ms: default_token_delay_ms(),
            source_count: default_source_count(),
            persist_tool_messages: false,
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
        }
    }
}

/// `[gateway]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Bearer tokens accepted by the API and the user each maps to
    #[serde(default)]
    pub users: Vec<GatewayUser>,
}

fn default_port() -> u16 {
    5231
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            users: Vec::new(),
        }
    }
}

/// One `[[gateway.users]]` entry.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayUser {
    pub token: String,
    pub user_id: i32,
}

impl std::fmt::Debug for GatewayUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayUser")
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from `path`, or the default path
    /// (`~/.mnemo/config.toml`) when none is given.
    ///
    /// Environment overrides (highest priority):
    /// - `MNEMO_API_KEY`, then `OPENROUTER_API_KEY` (only when the file has no key)
    /// - `MNEMO_MODEL`
    /// - `MNEMO_DATA_DIR`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_dir().join("config.toml"),
        };
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("MNEMO_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .filter(|k| !k.trim().is_empty());
        }

        if let Some(model) = lookup("MNEMO_MODEL").filter(|m| !m.is_empty()) {
            self.model = model;
        }

        if let Some(dir) = lookup("MNEMO_DATA_DIR").filter(|d| !d.is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mnemo")
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("data"))
    }

    /// Path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("mnemo.db")
    }

    /// Directory holding per-user vector collections.
    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir().join("vectorstore")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rounds must be at least 1".into(),
            ));
        }

        if self.agent.keep_recent_messages == 0 {
            return Err(ConfigError::ValidationError(
                "agent.keep_recent_messages must be at least 1".into(),
            ));
        }

        if self.agent.compact_threshold_chars == 0 {
            return Err(ConfigError::ValidationError(
                "agent.compact_threshold_chars must be > 0".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown store backend '{}' (expected sqlite or memory)",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Generate a default config.toml content.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            data_dir: None,
            agent: AgentConfig::default(),
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
