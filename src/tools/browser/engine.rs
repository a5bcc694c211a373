//! Engine and page seams over the browser-automation library.
//!
//! `BrowserSession` and the tool registry only talk to these traits; the
//! chromium implementation lives in [`super::chromium`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::config::BrowserConfig;
use crate::tools::browser::error::BrowserError;
use crate::tools::browser::host::HostEnvironment;

/// Fixed page dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<&BrowserConfig> for Viewport {
    fn from(config: &BrowserConfig) -> Self {
        Self::new(config.viewport_width, config.viewport_height)
    }
}

/// How a tool names the element it acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementLocator {
    /// CSS selector
    Css(String),
    /// Visible text of a clickable or editable element
    Text(String),
}

impl fmt::Display for ElementLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementLocator::Css(selector) => write!(f, "selector `{}`", selector),
            ElementLocator::Text(text) => write!(f, "text \"{}\"", text),
        }
    }
}

/// A live page.
///
/// Handles are only valid for the tool invocation that fetched them; the
/// session may replace the page between invocations.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Identity of this page within the process
    fn id(&self) -> u64;

    /// Viewport the page was opened with
    fn viewport(&self) -> Viewport;

    /// Whether the page has been closed or crashed
    fn is_closed(&self) -> bool;

    /// Navigate and wait for the load; returns the final URL
    async fn navigate(&self, url: &str) -> Result<String, BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    async fn title(&self) -> Result<String, BrowserError>;

    /// Visible text of the document body
    async fn text_content(&self) -> Result<String, BrowserError>;

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), BrowserError>;

    /// Go back one history entry; returns the resulting URL
    async fn go_back(&self) -> Result<String, BrowserError>;

    async fn click(&self, locator: &ElementLocator) -> Result<(), BrowserError>;

    /// Focus the element, type `text`, optionally press Enter
    async fn type_text(
        &self,
        locator: &ElementLocator,
        text: &str,
        submit: bool,
    ) -> Result<(), BrowserError>;

    /// Close the page; closing an already closed page succeeds
    async fn close(&self) -> Result<(), BrowserError>;
}

/// A running browser process.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Open a fresh page with the given viewport
    async fn open_page(&self, viewport: Viewport) -> Result<Arc<dyn PageHandle>, BrowserError>;

    /// Close the browser and release the automation engine
    async fn shutdown(&self) -> Result<(), BrowserError>;
}

/// Starts browser engines.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(
        &self,
        config: &BrowserConfig,
        host: &HostEnvironment,
    ) -> Result<Box<dyn BrowserEngine>, BrowserError>;
}
