//! Browser error types.

use thiserror::Error;

/// Errors that can occur during browser operations.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("singleton already initialized: the browser session exists")]
    AlreadyInitialized,

    #[error("browser session has been shut down")]
    SessionClosed,

    #[error("page unavailable: {0}")]
    PageUnavailable(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),
}

/// Markers chromiumoxide puts in errors once a target or connection is gone.
const DEAD_PAGE_MARKERS: &[&str] = &[
    "AlreadyClosed",
    "ConnectionClosed",
    "Target closed",
    "No target with given id",
    "Session with given id not found",
    "channel closed",
];

impl BrowserError {
    /// Whether the page must be replaced before retrying
    pub fn is_page_unavailable(&self) -> bool {
        matches!(self, Self::PageUnavailable(_))
    }
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        let text = err.to_string();
        if DEAD_PAGE_MARKERS.iter().any(|m| text.contains(m)) {
            BrowserError::PageUnavailable(text)
        } else {
            BrowserError::Cdp(text)
        }
    }
}
