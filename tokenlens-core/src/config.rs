//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/tokenlens/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/tokenlens/` (~/.config/tokenlens/)
//! - State/Logs: `$XDG_STATE_HOME/tokenlens/` (~/.local/state/tokenlens/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// LLM configuration for the enrichment collaborator (optional)
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    /// Pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// LLM provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// Model to use
    pub model: String,
    /// API endpoint (optional, uses default for provider)
    pub endpoint: Option<String>,
    /// API key (can also use env var)
    pub api_key: Option<String>,
    /// HTTP request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Supported LLM providers
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Claude,
    OpenAI,
}

impl LlmProvider {
    /// Returns the default endpoint for this provider
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://localhost:11434",
            LlmProvider::Claude => "https://api.anthropic.com",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }
}

fn default_llm_timeout() -> u64 {
    30
}

/// Pipeline tuning knobs
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// A part is "large" when its token count exceeds this fraction of the
    /// conversation total
    #[serde(default = "default_large_part_ratio")]
    pub large_part_ratio: f64,

    /// Messages per chunk between yields in cooperative token counting
    #[serde(default = "default_count_chunk_size")]
    pub count_chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            large_part_ratio: default_large_part_ratio(),
            count_chunk_size: default_count_chunk_size(),
        }
    }
}

impl PipelineConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !(self.large_part_ratio > 0.0 && self.large_part_ratio <= 1.0) {
            return Err(Error::Config(
                "pipeline.large_part_ratio must be in (0, 1]".to_string(),
            ));
        }
        if self.count_chunk_size == 0 {
            return Err(Error::Config(
                "pipeline.count_chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_large_part_ratio() -> f64 {
    0.10
}

fn default_count_chunk_size() -> usize {
    16
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/tokenlens/config.toml` (~/.config/tokenlens/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("tokenlens").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/tokenlens/` (~/.local/state/tokenlens/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("tokenlens")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/tokenlens/tokenlens.log` (~/.local/state/tokenlens/tokenlens.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("tokenlens.log")
    }
}
