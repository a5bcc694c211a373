//! LLM module - Language Model integrations
//!
//! Provides the oracle abstraction and its OpenAI-compatible backend.

pub mod openai;
pub mod traits;

pub use openai::OpenAIClient;
pub use traits::{
    AssistantSpec, AssistantThread, GenerateOptions, LLMProvider, LLMResponse, Lookup, RemoteAssistant,
    StreamCallback, TokenUsage,
};
