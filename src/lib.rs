//! Browsing Agent - LLM-driven web browsing assistant
//!
//! Receives a natural-language task, converses with a tool-calling oracle,
//! and drives a single Chromium session to accomplish it.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, and error handling
//! - **LLM**: Oracle abstraction with an OpenAI-compatible client
//! - **Tools**: Tool registry with browser and content tools
//! - **Agent**: Conversation loop, assistant identities and roles
//! - **Server**: HTTP and WebSocket front ends
//!
//! # Usage
//!
//! ```rust,no_run
//! use browsing_agent::agent::{Agent, AgentRole};
//! use browsing_agent::Config;
//!
//! #[tokio::main]
//! async fn main() -> browsing_agent::Result<()> {
//!     let agent = Agent::from_config(Config::load())?;
//!     let outcome = agent
//!         .run("Find the weather in Paris", AgentRole::BrowsingAgent)
//!         .await?;
//!     println!("{}", outcome.final_message);
//!     agent.browser().shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod core;
pub mod llm;
pub mod server;
pub mod tools;

// Re-export commonly used items
pub use agent::Agent;
pub use crate::core::{AgentError, Config, Result};
