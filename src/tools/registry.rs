//! Tool registry - manages and dispatches tool calls
//!
//! Central hub for tool definitions and for routing tool calls to handlers.
//! Execution never fails: every outcome, including an unknown tool name or
//! a dead page, comes back as a [`ToolResult`] the oracle can read.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::core::config::Config;
use crate::core::{FailureKind, ToolCall, ToolCategory, ToolDefinition, ToolResult};
use crate::tools::browser::{BrowserAction, BrowserError, BrowserManager, BrowserToolSettings};
use crate::tools::content::{analyze, sanitize_filename, AnalyzeArgs, DirectorySink, FileSink, SaveArgs};

/// Every tool the agent can call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ReadUrl,
    Scroll,
    JumpToSearchEngine,
    GoBack,
    Wait,
    ClickElement,
    InputText,
    AnalyzeContent,
    SaveToFile,
}

impl ToolName {
    /// All tools, in the order they are offered to the oracle
    pub const ALL: [ToolName; 9] = [
        ToolName::ReadUrl,
        ToolName::Scroll,
        ToolName::JumpToSearchEngine,
        ToolName::GoBack,
        ToolName::Wait,
        ToolName::ClickElement,
        ToolName::InputText,
        ToolName::AnalyzeContent,
        ToolName::SaveToFile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ReadUrl => "read_url",
            ToolName::Scroll => "scroll",
            ToolName::JumpToSearchEngine => "jump_to_search_engine",
            ToolName::GoBack => "go_back",
            ToolName::Wait => "wait",
            ToolName::ClickElement => "click_element",
            ToolName::InputText => "input_text",
            ToolName::AnalyzeContent => "analyze_content",
            ToolName::SaveToFile => "save_to_file",
        }
    }

    pub fn category(&self) -> ToolCategory {
        match self {
            ToolName::AnalyzeContent => ToolCategory::Content,
            ToolName::SaveToFile => ToolCategory::Storage,
            _ => ToolCategory::Browser,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("Unknown tool: {}", s))
    }
}

/// Registry of available tools
pub struct ToolRegistry {
    /// Tool definitions indexed by name
    definitions: HashMap<ToolName, ToolDefinition>,
    /// Owner of the browser session the browser tools act on
    browser: Arc<BrowserManager>,
    settings: BrowserToolSettings,
    sink: Arc<dyn FileSink>,
}

impl ToolRegistry {
    /// Create a registry with every tool registered
    pub fn new(
        browser: Arc<BrowserManager>,
        settings: BrowserToolSettings,
        sink: Arc<dyn FileSink>,
    ) -> Self {
        let mut registry = Self {
            definitions: HashMap::new(),
            browser,
            settings,
            sink,
        };

        registry.register_browser_tools();
        registry.register_content_tools();

        registry
    }

    /// Registry saving into the configured output directory
    pub fn from_config(config: &Config, browser: Arc<BrowserManager>) -> Self {
        Self::new(
            browser,
            BrowserToolSettings::from(&config.browser),
            Arc::new(DirectorySink::new(&config.storage.output_dir)),
        )
    }

    /// Register browser automation tools
    fn register_browser_tools(&mut self) {
        self.register(
            ToolName::ReadUrl,
            "Read the text of a web page. Navigates to `url` first when given, \
             otherwise reads the current page.",
            json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL to open (optional)"
                    }
                }
            }),
        );

        self.register(
            ToolName::Scroll,
            "Scroll the current page up or down",
            json!({
                "type": "object",
                "properties": {
                    "direction": {
                        "type": "string",
                        "enum": ["up", "down"],
                        "description": "Scroll direction"
                    },
                    "amount": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Pixels to scroll (default 600)"
                    }
                },
                "required": ["direction"]
            }),
        );

        self.register(
            ToolName::JumpToSearchEngine,
            "Open the search engine, searching for `query` when given",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search terms (optional)"
                    }
                }
            }),
        );

        self.register(
            ToolName::GoBack,
            "Go back to the previous page in history",
            json!({
                "type": "object",
                "properties": {}
            }),
        );

        self.register(
            ToolName::Wait,
            "Wait for the page to settle",
            json!({
                "type": "object",
                "properties": {
                    "seconds": {
                        "type": "number",
                        "minimum": 0,
                        "maximum": 30,
                        "description": "Seconds to wait"
                    }
                },
                "required": ["seconds"]
            }),
        );

        self.register(
            ToolName::ClickElement,
            "Click an element on the current page, found either by CSS selector \
             or by its visible text. Give exactly one of the two.",
            json!({
                "type": "object",
                "properties": {
                    "selector": {
                        "type": "string",
                        "description": "CSS selector of the element"
                    },
                    "text": {
                        "type": "string",
                        "description": "Visible text of the element"
                    }
                }
            }),
        );

        self.register(
            ToolName::InputText,
            "Type into an input on the current page, found by CSS selector or \
             by visible text or placeholder. Give exactly one of the two.",
            json!({
                "type": "object",
                "properties": {
                    "selector": {
                        "type": "string",
                        "description": "CSS selector of the input"
                    },
                    "text": {
                        "type": "string",
                        "description": "Label, placeholder or visible text of the input"
                    },
                    "value": {
                        "type": "string",
                        "description": "Text to type"
                    },
                    "submit": {
                        "type": "boolean",
                        "description": "Press Enter after typing"
                    }
                },
                "required": ["value"]
            }),
        );
    }

    /// Register content and storage tools
    fn register_content_tools(&mut self) {
        self.register(
            ToolName::AnalyzeContent,
            "Analyze text: counts, headings, links, and the sentences most \
             relevant to an optional query",
            json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "The text to analyze"
                    },
                    "query": {
                        "type": "string",
                        "description": "What to look for (optional)"
                    }
                },
                "required": ["content"]
            }),
        );

        self.register(
            ToolName::SaveToFile,
            "Save content to a file in the output directory",
            json!({
                "type": "object",
                "properties": {
                    "filename": {
                        "type": "string",
                        "description": "File name, without directories"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write"
                    }
                },
                "required": ["filename", "content"]
            }),
        );
    }

    /// Register a tool definition
    fn register(&mut self, name: ToolName, description: &str, parameters: Value) {
        self.definitions.insert(
            name,
            ToolDefinition::function(name.as_str(), description, parameters),
        );
    }

    /// Get all tool definitions
    pub fn all_definitions(&self) -> Vec<ToolDefinition> {
        self.definitions_for(&ToolName::ALL)
    }

    /// Definitions for `names`, in the order given
    pub fn definitions_for(&self, names: &[ToolName]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|name| self.definitions.get(name).cloned())
            .collect()
    }

    /// Get tool definitions by category
    pub fn definitions_by_category(&self, category: ToolCategory) -> Vec<ToolDefinition> {
        let names: Vec<ToolName> = ToolName::ALL
            .into_iter()
            .filter(|name| name.category() == category)
            .collect();
        self.definitions_for(&names)
    }

    /// The browser session owner shared with the agent
    pub fn browser(&self) -> &Arc<BrowserManager> {
        &self.browser
    }

    /// Execute a tool call
    pub async fn execute(&self, tool_call: &ToolCall) -> ToolResult {
        let name = match tool_call.name.parse::<ToolName>() {
            Ok(name) => name,
            Err(message) => {
                warn!(tool = %tool_call.name, "oracle requested unknown tool");
                return ToolResult::failure(&tool_call.name, FailureKind::UnknownTool, message);
            }
        };

        debug!(tool = %name, arguments = %tool_call.arguments, "executing tool");

        match name.category() {
            ToolCategory::Browser => self.execute_browser_tool(name, tool_call).await,
            ToolCategory::Content => self.execute_content_tool(name, tool_call),
            ToolCategory::Storage => self.execute_storage_tool(name, tool_call).await,
        }
    }

    /// Execute a browser tool against the page current right now
    async fn execute_browser_tool(&self, name: ToolName, tool_call: &ToolCall) -> ToolResult {
        let action = match BrowserAction::parse(name, &tool_call.arguments, &self.settings) {
            Ok(action) => action,
            Err(detail) => return invalid_arguments(name, detail),
        };

        let session = match self.browser.acquire().await {
            Ok(session) => session,
            Err(e) => return browser_failure(name, e),
        };
        let page = session.current_page().await;

        match action.run(name, page.as_ref(), &self.settings).await {
            Ok(result) => result,
            Err(e) => browser_failure(name, e),
        }
    }

    /// Execute a content tool
    fn execute_content_tool(&self, name: ToolName, tool_call: &ToolCall) -> ToolResult {
        let args: AnalyzeArgs = match serde_json::from_value(tool_call.arguments.clone()) {
            Ok(args) => args,
            Err(e) => return invalid_arguments(name, e.to_string()),
        };

        let analysis = analyze(&args.content, args.query.as_deref());
        let output = analysis.render(args.query.as_deref());
        match serde_json::to_value(&analysis) {
            Ok(data) => ToolResult::success_with_data(name.as_str(), output, data),
            Err(_) => ToolResult::success(name.as_str(), output),
        }
    }

    /// Execute a storage tool
    async fn execute_storage_tool(&self, name: ToolName, tool_call: &ToolCall) -> ToolResult {
        let args: SaveArgs = match serde_json::from_value(tool_call.arguments.clone()) {
            Ok(args) => args,
            Err(e) => return invalid_arguments(name, e.to_string()),
        };

        let filename = match sanitize_filename(&args.filename) {
            Ok(filename) => filename,
            Err(e) => return invalid_arguments(name, e.to_string()),
        };

        match self.sink.write(&filename, &args.content).await {
            Ok(path) => ToolResult::success_with_data(
                name.as_str(),
                format!("Saved {} bytes to {}", args.content.len(), path.display()),
                json!({ "path": path.display().to_string() }),
            ),
            Err(e) => {
                warn!(filename = %filename, error = %e, "failed to save file");
                ToolResult::failure(name.as_str(), FailureKind::Storage, e.to_string())
            }
        }
    }
}

fn invalid_arguments(name: ToolName, detail: impl fmt::Display) -> ToolResult {
    ToolResult::failure(
        name.as_str(),
        FailureKind::InvalidArguments,
        format!("invalid arguments: {}", detail),
    )
}

fn browser_failure(name: ToolName, err: BrowserError) -> ToolResult {
    let kind = match &err {
        BrowserError::PageUnavailable(_) => FailureKind::PageUnavailable,
        BrowserError::InvalidAction(_) => FailureKind::InvalidArguments,
        _ => FailureKind::Page,
    };
    warn!(tool = %name, error = %err, kind = ?kind, "browser tool failed");
    ToolResult::failure(name.as_str(), kind, err.to_string())
}
