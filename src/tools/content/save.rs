//! Save-to-file tool
//!
//! Writes agent output into a single output directory. Filenames from the
//! oracle are reduced to a bare, safe file name first.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::core::{AgentError, Result};

/// Longest file name accepted after sanitising
const MAX_FILENAME_CHARS: usize = 128;

/// Arguments of `save_to_file`
#[derive(Debug, Clone, Deserialize)]
pub struct SaveArgs {
    pub filename: String,
    pub content: String,
}

/// Destination for saved content
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Write `content` under the already sanitised `filename`; returns where
    /// it landed
    async fn write(&self, filename: &str, content: &str) -> Result<PathBuf>;
}

/// Writes into one directory, creating it on first use
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileSink for DirectorySink {
    async fn write(&self, filename: &str, content: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(filename);
        tokio::fs::write(&path, content).await?;
        info!(path = %path.display(), bytes = content.len(), "saved file");
        Ok(path)
    }
}

/// Reduce an oracle-supplied name to a plain file name.
///
/// Directory components are dropped and anything outside
/// `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let base = raw
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect();

    if cleaned.trim_matches('.').is_empty() {
        return Err(AgentError::tool_argument(format!(
            "`{}` is not a usable file name",
            raw
        )));
    }

    Ok(cleaned)
}
