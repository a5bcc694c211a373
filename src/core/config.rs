//! Configuration management for the browsing agent
//!
//! Supports environment variables, a TOML config file, and CLI overrides.
//!
//! Config file location: ~/.config/browsing-agent/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::agent::AgentRole;
use crate::core::error::{AgentError, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP / WebSocket listener
    #[serde(default)]
    pub server: ServerConfig,
    /// Language model provider
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Browser session
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Conversation loop
    #[serde(default)]
    pub agent: AgentConfig,
    /// Output of the save tool
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env::var("AGENT_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("AGENT_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3030),
        }
    }
}

/// Language model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,
    /// Model used for assistants and chat
    pub model: String,
    /// API key; normally taken from OPENAI_API_KEY
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Path of an OAI_CONFIG_LIST style JSON file
    #[serde(default)]
    pub config_list_path: Option<PathBuf>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: env::var("AGENT_MODEL").unwrap_or_else(|_| "gpt-4-turbo-preview".to_string()),
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            timeout_secs: 120,
            config_list_path: None,
        }
    }
}

/// Browser session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Fixed remote debugging port
    pub remote_debugging_port: u16,
    /// Viewport width for every page
    pub viewport_width: u32,
    /// Viewport height for every page
    pub viewport_height: u32,
    /// X display the browser window attaches to
    pub display: String,
    /// Explicit Chrome/Chromium executable
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
    /// Bound for navigation and element waits in ms
    pub navigation_timeout_ms: u64,
    /// Search engine opened by `jump_to_search_engine`
    pub search_engine_url: String,
    /// Maximum characters returned by `read_url`
    pub max_read_chars: usize,
    /// Locale override; detected from the host when unset
    #[serde(default)]
    pub locale: Option<String>,
    /// Timezone override; detected from the host when unset
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: env::var("AGENT_BROWSER_HEADLESS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            remote_debugging_port: 9222,
            viewport_width: 960,
            viewport_height: 1080,
            display: env::var("DISPLAY").unwrap_or_else(|_| ":99".to_string()),
            chrome_path: env::var("CHROME_PATH").ok().map(PathBuf::from),
            navigation_timeout_ms: 30000,
            search_engine_url: "https://www.google.com".to_string(),
            max_read_chars: 12000,
            locale: None,
            timezone: None,
        }
    }
}

/// Conversation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Role used when a request does not name one
    pub role: AgentRole,
    /// Substring that ends the conversation when the assistant emits it
    pub termination_sentinel: String,
    /// Safety bound on oracle turns
    pub max_turns: usize,
    /// Sampling temperature for tool selection
    pub temperature: f32,
    /// Where assistant identities are persisted
    #[serde(default)]
    pub identity_store_path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            role: AgentRole::BrowsingAgent,
            termination_sentinel: "TERMINATE".to_string(),
            max_turns: 25,
            temperature: 0.1,
            identity_store_path: None,
        }
    }
}

/// Save tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory files are written into
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: env::var("AGENT_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("output")),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("browsing-agent")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults.
    /// Priority: CLI args > config file > env vars > defaults
    ///
    /// Call once from startup after the `.env` file has been loaded.
    pub fn load() -> Self {
        match Self::load_from_file() {
            Ok(mut config) => {
                // The key never lives in the file
                config.oracle.api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
                config
            }
            Err(AgentError::Config(reason)) if reason.starts_with("Config file not found") => {
                tracing::debug!("no config file, using default configuration");
                Self::default()
            }
            Err(e) => {
                tracing::error!(error = %e, "invalid config file, using default configuration");
                Self::default()
            }
        }
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(AgentError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| AgentError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AgentError::config(format!("Failed to parse config: {}", e)))?;
        let problems = config.loop_problems();
        if !problems.is_empty() {
            return Err(AgentError::config(problems.join("; ")));
        }
        Ok(config)
    }

    /// Check the settings the oracle and the loop need, reporting every problem at once
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.oracle.api_key.trim().is_empty() {
            problems.push("OPENAI_API_KEY not found in environment variables".to_string());
        }
        problems.extend(self.loop_problems());

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AgentError::config(problems.join("; ")))
        }
    }

    /// An empty sentinel matches every reply, and zero turns never asks the oracle
    fn loop_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.agent.termination_sentinel.trim().is_empty() {
            problems.push("termination sentinel must not be empty".to_string());
        }
        if self.agent.max_turns == 0 {
            problems.push("max_turns must be at least 1".to_string());
        }
        problems
    }

    /// Resolved identity store location
    pub fn identity_store_path(&self) -> PathBuf {
        self.agent
            .identity_store_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("assistants.json"))
    }

    /// Socket address for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}
