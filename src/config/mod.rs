//! Configuration management for sqlmcp

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LlmConfig {
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    /// Timeout for a single model request
    pub request_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "granite3.1-moe".to_string(),
            request_timeout_secs: 300,
        }
    }
}

/// Tool server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// SQLite file holding `people` and `interactions`
    pub db_path: PathBuf,
    /// Register the raw SQL passthrough tools (`add_data`, `read_data`)
    pub raw_sql: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            db_path: PathBuf::from("demo.db"),
            raw_sql: true,
        }
    }
}

/// Chat front-end settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub host: String,
    pub port: u16,
    /// MCP endpoint of the tool server
    pub server_url: String,
    /// Number of interactions shown in the recent panel
    pub recent_limit: usize,
    pub turn_timeout_secs: u64,
    pub tool_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7860,
            server_url: "http://127.0.0.1:8000/mcp".to_string(),
            recent_limit: 5,
            turn_timeout_secs: 300,
            tool_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    /// Overrides the built-in system prompt when set
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            system_prompt: None,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Config::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Environment variables take precedence over the config file
    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            self.llm.ollama.base_url = url;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            self.llm.ollama.model = model;
        }
        if let Ok(url) = std::env::var("SQLMCP_SERVER_URL") {
            self.chat.server_url = url;
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "sqlmcp") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }
}
