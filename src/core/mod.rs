//! Core module - shared infrastructure
//!
//! This module contains foundational types, configuration, and error handling
//! used throughout the application.

pub mod config;
pub mod config_list;
pub mod error;
pub mod types;

pub use config::Config;
pub use config_list::{ConfigList, ProviderEntry};
pub use error::{AgentError, Result};
pub use types::*;
