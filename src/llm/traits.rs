//! LLM Provider trait for abstracting the oracle backend
//!
//! The agent only sees this trait: assistant lookup/creation plus a chat
//! call, made through a resolved assistant, that may request tools. Tests
//! substitute a scripted provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{Message, Result, ToolCall, ToolDefinition};

/// Response from an LLM provider
#[derive(Debug, Clone, Default)]
pub struct LLMResponse {
    /// Text content of the response
    pub content: String,
    /// Any tool calls the model wants to make
    pub tool_calls: Vec<ToolCall>,
    /// Token usage information
    pub usage: Option<TokenUsage>,
    /// Model that generated the response
    pub model: String,
}

impl LLMResponse {
    /// Plain text reply with no tool calls
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Reply that requests tool calls
    pub fn with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            ..Self::default()
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Options for LLM generation
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Temperature for sampling (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
}

/// Outcome of looking something up remotely. Absence is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

/// An assistant as the provider stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAssistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// What to create when an assistant does not exist yet
#[derive(Debug, Clone, Serialize)]
pub struct AssistantSpec {
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
}

/// One conversation held on the oracle side by a remote assistant.
///
/// The caller keeps passing the whole local history; the provider sends only
/// what the remote thread has not seen yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantThread {
    /// Remote assistant that answers every turn
    pub assistant_id: String,
    /// Created on the first turn
    pub thread_id: Option<String>,
    /// Run paused until tool outputs are submitted
    pub pending_run: Option<String>,
    delivered: usize,
}

impl AssistantThread {
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            ..Self::default()
        }
    }

    /// Messages appended since the last [`AssistantThread::mark_delivered`]
    pub fn undelivered<'a>(&self, messages: &'a [Message]) -> &'a [Message] {
        messages.get(self.delivered..).unwrap_or(&[])
    }

    /// Record that the first `count` messages are on the remote thread
    pub fn mark_delivered(&mut self, count: usize) {
        self.delivered = self.delivered.max(count);
    }
}

/// Callback function for streaming tokens
pub type StreamCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Fetch a stored assistant; a missing id is [`Lookup::NotFound`]
    async fn retrieve_assistant(&self, id: &str) -> Result<Lookup<RemoteAssistant>>;

    /// Create an assistant and return it with its new id
    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<RemoteAssistant>;

    /// Advance `thread` with the new tail of `messages` and return the
    /// assistant's next reply
    async fn chat_with_tools(
        &self,
        thread: &mut AssistantThread,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse>;

    /// Same as [`LLMProvider::chat_with_tools`], calling `on_token` for each
    /// text fragment as it arrives
    async fn chat_stream_with_tools(
        &self,
        thread: &mut AssistantThread,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: Option<GenerateOptions>,
        on_token: StreamCallback,
    ) -> Result<LLMResponse>;

    /// Get the provider name
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_tracks_undelivered_tail() {
        let history = vec![
            Message::system("browse"),
            Message::user("weather?"),
            Message::assistant("checking"),
        ];
        let mut thread = AssistantThread::new("asst_1");
        assert_eq!(thread.undelivered(&history).len(), 3);

        thread.mark_delivered(2);
        assert_eq!(thread.undelivered(&history)[0].role, "assistant");

        thread.mark_delivered(1);
        assert_eq!(thread.undelivered(&history).len(), 1);

        thread.mark_delivered(5);
        assert!(thread.undelivered(&history).is_empty());
    }
}
