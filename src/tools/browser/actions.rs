//! Browser tool actions
//!
//! Each tool call is parsed into a [`BrowserAction`] before the page is
//! touched, then run against the page current at that moment.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::core::config::BrowserConfig;
use crate::core::ToolResult;
use crate::tools::browser::engine::{ElementLocator, PageHandle};
use crate::tools::browser::error::BrowserError;
use crate::tools::registry::ToolName;

/// Longest wait the `wait` tool accepts
pub const MAX_WAIT_SECS: f64 = 30.0;

/// Scroll distance when the oracle gives none
pub const DEFAULT_SCROLL_PIXELS: u32 = 600;

/// Settings the browser tools read from configuration
#[derive(Debug, Clone)]
pub struct BrowserToolSettings {
    pub search_engine_url: String,
    pub max_read_chars: usize,
}

impl From<&BrowserConfig> for BrowserToolSettings {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            search_engine_url: config.search_engine_url.clone(),
            max_read_chars: config.max_read_chars,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReadUrlArgs {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Deserialize)]
struct ScrollArgs {
    direction: ScrollDirection,
    #[serde(default)]
    amount: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    #[serde(default)]
    query: Option<String>,
}

/// `go_back` takes no parameters
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GoBackArgs {}

#[derive(Debug, Deserialize)]
struct WaitArgs {
    seconds: f64,
}

#[derive(Debug, Deserialize)]
struct LocatorArgs {
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl LocatorArgs {
    fn into_locator(self) -> Result<ElementLocator, String> {
        let selector = self.selector.filter(|s| !s.trim().is_empty());
        let text = self.text.filter(|s| !s.trim().is_empty());
        match (selector, text) {
            (Some(selector), None) => Ok(ElementLocator::Css(selector)),
            (None, Some(text)) => Ok(ElementLocator::Text(text)),
            (Some(_), Some(_)) => Err("give either `selector` or `text`, not both".to_string()),
            (None, None) => Err("one of `selector` or `text` is required".to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InputTextArgs {
    #[serde(flatten)]
    locator: LocatorArgs,
    value: String,
    #[serde(default)]
    submit: bool,
}

/// A validated browser tool call
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserAction {
    ReadUrl { url: Option<Url> },
    Scroll { direction: ScrollDirection, pixels: u32 },
    JumpToSearchEngine { url: Url },
    GoBack,
    Wait { duration: Duration },
    Click { locator: ElementLocator },
    InputText { locator: ElementLocator, value: String, submit: bool },
}

fn decode<T: serde::de::DeserializeOwned>(arguments: &Value) -> Result<T, String> {
    // Some models send `null` for tools without parameters
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments.clone()
    };
    serde_json::from_value(arguments).map_err(|e| e.to_string())
}

/// Accepts bare hosts like `example.com`; only http(s) is allowed.
pub fn parse_web_url(raw: &str) -> Result<Url, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("url is empty".to_string());
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let url = Url::parse(&candidate).map_err(|e| format!("invalid url `{}`: {}", raw, e))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(format!("url `{}` has no host", raw)),
        scheme => Err(format!("unsupported url scheme `{}`", scheme)),
    }
}

/// Search engine URL, with `q=<query>` on its `/search` path when given.
pub fn search_url(base: &str, query: Option<&str>) -> Result<Url, String> {
    let mut url = parse_web_url(base)?;
    if let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) {
        if url.path() == "/" || url.path().is_empty() {
            url.set_path("/search");
        }
        url.query_pairs_mut().append_pair("q", query);
    }
    Ok(url)
}

fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

impl BrowserAction {
    /// Validate arguments for a browser tool
    pub fn parse(
        name: ToolName,
        arguments: &Value,
        settings: &BrowserToolSettings,
    ) -> Result<Self, String> {
        match name {
            ToolName::ReadUrl => {
                let args: ReadUrlArgs = decode(arguments)?;
                let url = args
                    .url
                    .filter(|u| !u.trim().is_empty())
                    .map(|u| parse_web_url(&u))
                    .transpose()?;
                Ok(Self::ReadUrl { url })
            }
            ToolName::Scroll => {
                let args: ScrollArgs = decode(arguments)?;
                Ok(Self::Scroll {
                    direction: args.direction,
                    pixels: args.amount.unwrap_or(DEFAULT_SCROLL_PIXELS),
                })
            }
            ToolName::JumpToSearchEngine => {
                let args: SearchArgs = decode(arguments)?;
                let url = search_url(&settings.search_engine_url, args.query.as_deref())?;
                Ok(Self::JumpToSearchEngine { url })
            }
            ToolName::GoBack => {
                let GoBackArgs {} = decode(arguments)?;
                Ok(Self::GoBack)
            }
            ToolName::Wait => {
                let args: WaitArgs = decode(arguments)?;
                if !args.seconds.is_finite() || !(0.0..=MAX_WAIT_SECS).contains(&args.seconds) {
                    return Err(format!(
                        "`seconds` must be between 0 and {}",
                        MAX_WAIT_SECS
                    ));
                }
                Ok(Self::Wait {
                    duration: Duration::from_secs_f64(args.seconds),
                })
            }
            ToolName::ClickElement => {
                let args: LocatorArgs = decode(arguments)?;
                Ok(Self::Click {
                    locator: args.into_locator()?,
                })
            }
            ToolName::InputText => {
                let args: InputTextArgs = decode(arguments)?;
                Ok(Self::InputText {
                    locator: args.locator.into_locator()?,
                    value: args.value,
                    submit: args.submit,
                })
            }
            other => Err(format!("`{}` is not a browser tool", other)),
        }
    }

    fn touches_page(&self) -> bool {
        !matches!(self, Self::Wait { .. })
    }

    /// Run against `page`
    pub async fn run(
        self,
        name: ToolName,
        page: &dyn PageHandle,
        settings: &BrowserToolSettings,
    ) -> Result<ToolResult, BrowserError> {
        if self.touches_page() && page.is_closed() {
            return Err(BrowserError::PageUnavailable(format!(
                "page {} is closed",
                page.id()
            )));
        }

        debug!(tool = %name, page_id = page.id(), "running browser action");

        match self {
            Self::ReadUrl { url } => {
                if let Some(url) = url {
                    page.navigate(url.as_str()).await?;
                }
                let title = page.title().await?;
                let current = page.current_url().await?;
                let text = page.text_content().await?;
                let (body, truncated) = truncate_chars(text.trim(), settings.max_read_chars);

                Ok(ToolResult::success_with_data(
                    name.as_str(),
                    format!("Title: {}\nURL: {}\n\n{}", title, current, body),
                    json!({
                        "title": title,
                        "url": current,
                        "characters": text.chars().count(),
                        "truncated": truncated,
                    }),
                ))
            }
            Self::Scroll { direction, pixels } => {
                let dy = match direction {
                    ScrollDirection::Down => i64::from(pixels),
                    ScrollDirection::Up => -i64::from(pixels),
                };
                page.scroll_by(0, dy).await?;
                Ok(ToolResult::success(
                    name.as_str(),
                    format!("Scrolled {:?} by {} pixels", direction, pixels).to_lowercase(),
                ))
            }
            Self::JumpToSearchEngine { url } => {
                let landed = page.navigate(url.as_str()).await?;
                Ok(ToolResult::success_with_data(
                    name.as_str(),
                    format!("Opened search engine at {}", landed),
                    json!({ "url": landed }),
                ))
            }
            Self::GoBack => {
                let landed = page.go_back().await?;
                Ok(ToolResult::success_with_data(
                    name.as_str(),
                    format!("Went back to {}", landed),
                    json!({ "url": landed }),
                ))
            }
            Self::Wait { duration } => {
                tokio::time::sleep(duration).await;
                Ok(ToolResult::success(
                    name.as_str(),
                    format!("Waited {:.1} seconds", duration.as_secs_f64()),
                ))
            }
            Self::Click { locator } => {
                page.click(&locator).await?;
                let landed = page.current_url().await?;
                Ok(ToolResult::success_with_data(
                    name.as_str(),
                    format!("Clicked element by {}", locator),
                    json!({ "url": landed }),
                ))
            }
            Self::InputText {
                locator,
                value,
                submit,
            } => {
                page.type_text(&locator, &value, submit).await?;
                let suffix = if submit { " and submitted" } else { "" };
                Ok(ToolResult::success(
                    name.as_str(),
                    format!("Typed '{}' into element by {}{}", value, locator, suffix),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BrowserToolSettings {
        BrowserToolSettings {
            search_engine_url: "https://www.google.com".to_string(),
            max_read_chars: 100,
        }
    }

    #[test]
    fn test_parse_web_url() {
        assert_eq!(
            parse_web_url("example.com").unwrap().as_str(),
            "https://example.com/"
        );
        assert!(parse_web_url("ftp://example.com").is_err());
        assert!(parse_web_url("   ").is_err());
        assert!(parse_web_url("javascript:alert(1)").is_err());
    }

    #[test]
    fn test_search_url_encodes_query() {
        let url = search_url("https://www.google.com", Some("weather in Paris")).unwrap();
        assert_eq!(url.as_str(), "https://www.google.com/search?q=weather+in+Paris");

        let bare = search_url("https://www.google.com", None).unwrap();
        assert_eq!(bare.as_str(), "https://www.google.com/");
    }

    #[test]
    fn test_click_requires_one_locator() {
        let none = BrowserAction::parse(ToolName::ClickElement, &json!({}), &settings());
        assert!(none.is_err());

        let both = BrowserAction::parse(
            ToolName::ClickElement,
            &json!({"selector": "#a", "text": "A"}),
            &settings(),
        );
        assert!(both.is_err());

        let text = BrowserAction::parse(
            ToolName::ClickElement,
            &json!({"text": "Sign in"}),
            &settings(),
        )
        .unwrap();
        assert_eq!(
            text,
            BrowserAction::Click {
                locator: ElementLocator::Text("Sign in".into())
            }
        );
    }

    #[test]
    fn test_wait_is_bounded() {
        assert!(BrowserAction::parse(ToolName::Wait, &json!({"seconds": 31}), &settings()).is_err());
        assert!(BrowserAction::parse(ToolName::Wait, &json!({"seconds": -1}), &settings()).is_err());
        assert!(BrowserAction::parse(ToolName::Wait, &json!({"seconds": "1"}), &settings()).is_err());
        assert_eq!(
            BrowserAction::parse(ToolName::Wait, &json!({"seconds": 1.5}), &settings()).unwrap(),
            BrowserAction::Wait {
                duration: Duration::from_millis(1500)
            }
        );
    }

    #[test]
    fn test_scroll_defaults_amount() {
        let action =
            BrowserAction::parse(ToolName::Scroll, &json!({"direction": "down"}), &settings())
                .unwrap();
        assert_eq!(
            action,
            BrowserAction::Scroll {
                direction: ScrollDirection::Down,
                pixels: DEFAULT_SCROLL_PIXELS
            }
        );
        assert!(
            BrowserAction::parse(ToolName::Scroll, &json!({"direction": "left"}), &settings())
                .is_err()
        );
    }

    #[test]
    fn test_go_back_accepts_null_arguments() {
        assert_eq!(
            BrowserAction::parse(ToolName::GoBack, &Value::Null, &settings()).unwrap(),
            BrowserAction::GoBack
        );
        assert_eq!(
            BrowserAction::parse(ToolName::GoBack, &json!({}), &settings()).unwrap(),
            BrowserAction::GoBack
        );
    }

    #[test]
    fn test_go_back_rejects_malformed_arguments() {
        let raw = Value::String("{oops".into());
        assert!(BrowserAction::parse(ToolName::GoBack, &raw, &settings()).is_err());
        assert!(
            BrowserAction::parse(ToolName::GoBack, &json!({"steps": 2}), &settings()).is_err()
        );
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        let (text, truncated) = truncate_chars("héllo wörld", 4);
        assert_eq!(text, "héll");
        assert!(truncated);

        let (text, truncated) = truncate_chars("short", 10);
        assert_eq!(text, "short");
        assert!(!truncated);
    }
}
