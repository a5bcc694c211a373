//! Shared types used across modules
//!
//! Contains message structures, tool definitions, and tool results.

use serde::{Deserialize, Serialize};

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (system, user, assistant, tool)
    pub role: String,
    /// Content of the message
    pub content: String,
    /// Tool calls made by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Call this message answers (tool role only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    /// Create an assistant message that requests tool calls
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut message = Self::assistant(content);
        if !tool_calls.is_empty() {
            message.tool_calls = Some(tool_calls);
        }
        message
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    /// Create a tool observation answering `tool_call_id`
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut message = Self::with_role("tool", content);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }
}

/// A tool call made by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back with the result
    #[serde(default)]
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// JSON arguments for the tool
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Definition of a tool that can be called by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Type of tool (always "function" for now)
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function details
    pub function: FunctionDefinition,
}

/// Function definition within a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Name of the function
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for the parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new function tool definition
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    /// Name of the described function
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Why a tool call did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Name is not in the registry
    UnknownTool,
    /// Arguments did not match the declared shape
    InvalidArguments,
    /// The current page is closed or crashed
    PageUnavailable,
    /// Page-level failure (element missing, navigation timeout, ...)
    Page,
    /// The save sink could not write
    Storage,
}

/// Structured failure carried by a [`ToolResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Result of executing a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Name of the tool that was executed
    pub tool_name: String,
    /// Whether the execution was successful
    pub ok: bool,
    /// Output from the tool
    pub output: String,
    /// Optional structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Failure details when `ok` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(tool_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            ok: true,
            output: output.into(),
            data: None,
            error: None,
        }
    }

    /// Create a successful result with structured data
    pub fn success_with_data(
        tool_name: impl Into<String>,
        output: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            data: Some(data),
            ..Self::success(tool_name, output)
        }
    }

    /// Create a failed result
    pub fn failure(tool_name: impl Into<String>, kind: FailureKind, error: impl Into<String>) -> Self {
        let message = error.into();
        Self {
            tool_name: tool_name.into(),
            ok: false,
            output: message.clone(),
            data: None,
            error: Some(ToolFailure { kind, message }),
        }
    }

    /// Failure kind, if any
    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Whether the page was gone when the tool ran
    pub fn is_page_unavailable(&self) -> bool {
        self.failure_kind() == Some(FailureKind::PageUnavailable)
    }

    /// Text fed back to the oracle as the observation for this call
    pub fn observation(&self) -> String {
        match &self.error {
            None => self.output.clone(),
            Some(failure) => serde_json::json!({
                "ok": false,
                "error": failure.message,
                "kind": failure.kind,
            })
            .to_string(),
        }
    }
}

/// Category of tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// Operates on the current browser page
    Browser,
    /// Pure transforms over text
    Content,
    /// Durable output
    Storage,
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolCategory::Browser => write!(f, "browser"),
            ToolCategory::Content => write!(f, "content"),
            ToolCategory::Storage => write!(f, "storage"),
        }
    }
}
