//! Provider config list in the OAI_CONFIG_LIST format
//!
//! A JSON array of provider entries. The `OAI_CONFIG_LIST` environment
//! variable may hold either the JSON text itself or a path to the file.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::core::error::{AgentError, Result};

/// Environment variable consulted before the configured path
pub const CONFIG_LIST_ENV: &str = "OAI_CONFIG_LIST";

/// One provider entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_type: Option<String>,
}

/// Filtered and enriched provider entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigList {
    entries: Vec<ProviderEntry>,
}

impl ConfigList {
    /// Parse entries from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let entries: Vec<ProviderEntry> = serde_json::from_str(text)
            .map_err(|e| AgentError::config(format!("invalid config list: {}", e)))?;
        Ok(Self { entries })
    }

    /// Read the list from `OAI_CONFIG_LIST` or `path`.
    ///
    /// Env value is tried as JSON first, then as a file path.
    pub fn read(path: Option<&Path>) -> Result<Self> {
        if let Ok(value) = env::var(CONFIG_LIST_ENV) {
            if let Ok(list) = Self::from_json(&value) {
                return Ok(list);
            }
            return Self::read_file(Path::new(&value));
        }

        match path {
            Some(path) => Self::read_file(path),
            None => Err(AgentError::config(format!(
                "{} is not set and no config list path is configured",
                CONFIG_LIST_ENV
            ))),
        }
    }

    fn read_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            AgentError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Load, keep only `model` entries, and set the API key on each.
    ///
    /// Failures are logged and produce an empty list.
    pub fn load_and_enrich(path: Option<&Path>, model: &str, api_key: &str) -> Self {
        match Self::read(path) {
            Ok(list) => {
                let list = list.filter_model(model).with_api_key(api_key);
                tracing::info!(entries = list.len(), model, "config list loaded");
                list
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load or enrich the config list");
                Self::default()
            }
        }
    }

    /// Keep entries for `model`
    pub fn filter_model(self, model: &str) -> Self {
        Self {
            entries: self
                .entries
                .into_iter()
                .filter(|entry| entry.model == model)
                .collect(),
        }
    }

    /// Overwrite every entry's API key
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        for entry in &mut self.entries {
            entry.api_key = Some(api_key.to_string());
        }
        self
    }

    /// First usable entry
    pub fn primary(&self) -> Option<&ProviderEntry> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
