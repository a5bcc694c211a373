//! Error types for the browsing agent
//!
//! `AgentError` follows the failure taxonomy of the system: configuration,
//! browser resource, tool argument, identity, transport and oracle failures.

use thiserror::Error;

use crate::tools::browser::BrowserError;

/// Main error type for agent operations
#[derive(Error, Debug)]
pub enum AgentError {
    /// Missing credentials or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Browser or page is unusable
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Malformed tool call
    #[error("Invalid tool arguments: {0}")]
    ToolArgument(String),

    /// Assistant role could not be resolved or created
    #[error("Identity error: {0}")]
    Identity(String),

    /// Streaming channel closed or broken
    #[error("Transport error: {0}")]
    Transport(String),

    /// Upstream language model call failed
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a tool argument error
    pub fn tool_argument(msg: impl Into<String>) -> Self {
        Self::ToolArgument(msg.into())
    }

    /// Create an identity error
    pub fn identity(msg: impl Into<String>) -> Self {
        Self::Identity(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an oracle error
    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::Oracle(msg.into())
    }
}
