//! Browser automation module
//!
//! Drives a single Chromium instance over CDP. The session owns one current
//! page at a time; tools look it up per call and never hold it.

mod actions;
mod chromium;
mod engine;
mod error;
mod host;
mod session;

pub use actions::{
    parse_web_url, search_url, BrowserAction, BrowserToolSettings, ScrollDirection,
    DEFAULT_SCROLL_PIXELS, MAX_WAIT_SECS,
};
pub use chromium::{ChromiumEngine, ChromiumLauncher, ChromiumPage};
pub use engine::{BrowserEngine, ElementLocator, EngineLauncher, PageHandle, Viewport};
pub use error::BrowserError;
pub use host::{normalize_locale, HostEnvironment, DEFAULT_LOCALE, DEFAULT_TIMEZONE};
pub use session::{BrowserManager, BrowserSession};
