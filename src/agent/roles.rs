//! Assistant roles
//!
//! A role fixes an assistant's instructions and the tools it may call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::tools::ToolName;

/// Named class of assistant configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    /// Drives the browser; may call every tool
    #[default]
    BrowsingAgent,
    /// Works on text it is given; no browser access
    ContentAgent,
}

const BROWSING_TOOLS: &[ToolName] = &ToolName::ALL;

const CONTENT_TOOLS: &[ToolName] = &[ToolName::AnalyzeContent, ToolName::SaveToFile];

impl AgentRole {
    pub const ALL: [AgentRole; 2] = [AgentRole::BrowsingAgent, AgentRole::ContentAgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::BrowsingAgent => "BrowsingAgent",
            AgentRole::ContentAgent => "ContentAgent",
        }
    }

    /// Tools this role is offered, in the order given to the oracle
    pub fn allowed_tools(&self) -> &'static [ToolName] {
        match self {
            AgentRole::BrowsingAgent => BROWSING_TOOLS,
            AgentRole::ContentAgent => CONTENT_TOOLS,
        }
    }

    pub fn allows(&self, tool: ToolName) -> bool {
        self.allowed_tools().contains(&tool)
    }

    /// Whether any of the role's tools touch the browser
    pub fn uses_browser(&self) -> bool {
        self.allowed_tools()
            .iter()
            .any(|tool| tool.category() == crate::core::ToolCategory::Browser)
    }

    /// System instructions, ending with the termination convention
    pub fn instructions(&self, sentinel: &str) -> String {
        let body = match self {
            AgentRole::BrowsingAgent => {
                "You are a web browsing assistant. You control a single browser page \
                 through tools. Use `jump_to_search_engine` to start a search, \
                 `read_url` to read the current page or open a URL, `click_element` \
                 and `input_text` to interact with elements, `scroll`, `go_back` and \
                 `wait` to move around, `analyze_content` to pick out what matters \
                 from long text, and `save_to_file` when asked to keep results.\n\
                 Call one tool at a time when a later step depends on the page an \
                 earlier one leaves behind. If a tool reports a failure, read the \
                 error and adapt instead of repeating the same call."
            }
            AgentRole::ContentAgent => {
                "You are a content assistant. You analyze text you are given with \
                 `analyze_content` and store results with `save_to_file`. You cannot \
                 browse the web."
            }
        };

        format!(
            "{}\n\nWhen the task is complete, reply with the final answer followed by \
             the word {} on its own. Do not write {} before the task is done.",
            body, sentinel, sentinel
        )
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = AgentError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AgentRole::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AgentError::identity(format!("unknown role: {}", s)))
    }
}
