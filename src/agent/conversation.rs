//! Conversation history management
//!
//! Holds one task's messages: system instructions, the user task, assistant
//! replies with their tool calls, and tool observations. Nothing outlives
//! the task.

use crate::core::{Message, ToolCall};

/// Manages conversation history
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    /// Message history
    messages: Vec<Message>,
    /// System prompt (always first)
    system_prompt: Option<String>,
}

impl Conversation {
    /// Create a new conversation
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system prompt
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    /// Add a user message
    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Add an assistant reply and the tool calls it requested
    pub fn add_assistant(&mut self, content: impl Into<String>, tool_calls: Vec<ToolCall>) {
        self.messages
            .push(Message::assistant_with_tools(content, tool_calls));
    }

    /// Add the observation answering `call_id`
    pub fn add_tool_result(&mut self, call_id: impl Into<String>, observation: impl Into<String>) {
        self.messages.push(Message::tool(call_id, observation));
    }

    /// Get all messages including system prompt
    pub fn get_messages(&self) -> Vec<Message> {
        let mut result = Vec::with_capacity(self.messages.len() + 1);

        if let Some(ref prompt) = self.system_prompt {
            result.push(Message::system(prompt.clone()));
        }

        result.extend(self.messages.iter().cloned());
        result
    }

    /// Get the last assistant message
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == "assistant")
    }

    /// Get message count
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
