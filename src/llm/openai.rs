//! OpenAI-compatible client implementation
//!
//! Async HTTP client for the assistants endpoints. Each conversation lives on
//! a remote thread; every turn is a streamed run of the resolved assistant,
//! and tool calls come back as a run waiting for tool outputs.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::{AgentError, Config, ConfigList, Message, Result, ToolCall, ToolDefinition};
use crate::llm::traits::{
    AssistantSpec, AssistantThread, GenerateOptions, LLMProvider, LLMResponse, Lookup,
    RemoteAssistant, StreamCallback, TokenUsage,
};

/// Header the assistants endpoints require
const ASSISTANTS_BETA: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// OpenAI API client
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

/// User message appended to a thread
#[derive(Debug, Serialize)]
struct ThreadMessageRequest<'a> {
    role: &'static str,
    content: &'a str,
}

/// Run creation request
#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    assistant_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ToolOutput<'a> {
    tool_call_id: &'a str,
    output: &'a str,
}

#[derive(Debug, Serialize)]
struct SubmitToolOutputsRequest<'a> {
    tool_outputs: Vec<ToolOutput<'a>>,
    stream: bool,
}

/// Tool call in the wire format; arguments travel as a JSON string
#[derive(Debug, Clone, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Debug, Clone, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Run object carried by `thread.run.*` events
#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    required_action: Option<RequiredAction>,
    #[serde(default)]
    last_error: Option<RunError>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct RequiredAction {
    submit_tool_outputs: RequiredToolOutputs,
}

#[derive(Debug, Deserialize)]
struct RequiredToolOutputs {
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// `thread.message.delta` payload
#[derive(Debug, Deserialize)]
struct MessageDeltaEvent {
    delta: MessageDelta,
}

#[derive(Debug, Default, Deserialize)]
struct MessageDelta {
    #[serde(default)]
    content: Vec<DeltaContent>,
}

#[derive(Debug, Deserialize)]
struct DeltaContent {
    #[serde(default)]
    text: Option<DeltaText>,
}

#[derive(Debug, Deserialize)]
struct DeltaText {
    #[serde(default)]
    value: Option<String>,
}

/// One dispatched server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

/// Splits a byte stream into server-sent events.
///
/// Bytes are buffered until a full line is available, so a multi-byte
/// character split across network chunks is decoded intact.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    pending: SseEvent,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = std::str::from_utf8(&line)
                .map_err(|e| AgentError::oracle(format!("stream is not valid UTF-8: {}", e)))?;
            if let Some(event) = self.line(line.trim_end_matches(['\r', '\n'])) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flush whatever the stream left without a trailing blank line
    fn finish(mut self) -> Result<Option<SseEvent>> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8(rest)
                .map_err(|e| AgentError::oracle(format!("stream is not valid UTF-8: {}", e)))?;
            if let Some(event) = self.line(line.trim_end_matches('\r')) {
                return Ok(Some(event));
            }
        }
        Ok(self.line(""))
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.pending.event.is_empty() && self.pending.data.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.pending));
        }

        if let Some(name) = line.strip_prefix("event:") {
            self.pending.event = name.trim().to_string();
        } else if let Some(data) = line.strip_prefix("data:") {
            if !self.pending.data.is_empty() {
                self.pending.data.push('\n');
            }
            self.pending.data.push_str(data.strip_prefix(' ').unwrap_or(data));
        }
        None
    }
}

/// Accumulates one streamed run
#[derive(Debug, Default)]
struct RunAccumulator {
    content: String,
    model: String,
    usage: Option<TokenUsage>,
    run_id: Option<String>,
    tool_calls: Vec<ToolCall>,
    requires_action: bool,
}

impl RunAccumulator {
    /// Feed one event; returns the text fragment it carried
    fn feed(&mut self, event: &SseEvent) -> Result<Option<String>> {
        match event.event.as_str() {
            "thread.message.delta" => {
                let delta: MessageDeltaEvent = match serde_json::from_str(&event.data) {
                    Ok(delta) => delta,
                    Err(e) => {
                        debug!(error = %e, "skipping unparseable message delta");
                        return Ok(None);
                    }
                };
                let fragment: String = delta
                    .delta
                    .content
                    .into_iter()
                    .filter_map(|part| part.text.and_then(|t| t.value))
                    .collect();
                if fragment.is_empty() {
                    return Ok(None);
                }
                self.content.push_str(&fragment);
                Ok(Some(fragment))
            }
            "error" => Err(AgentError::oracle(format!("stream error: {}", event.data))),
            "done" => Ok(None),
            name if name.starts_with("thread.run.") && !name.starts_with("thread.run.step") => {
                let run: RunObject = serde_json::from_str(&event.data)
                    .map_err(|e| AgentError::oracle(format!("unreadable run event {}: {}", name, e)))?;
                self.absorb(run)?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn absorb(&mut self, run: RunObject) -> Result<()> {
        if !run.model.is_empty() {
            self.model = run.model;
        }
        if run.usage.is_some() {
            self.usage = run.usage;
        }
        self.run_id = Some(run.id);

        match run.status.as_str() {
            "requires_action" => {
                let calls = run
                    .required_action
                    .map(|action| action.submit_tool_outputs.tool_calls)
                    .unwrap_or_default();
                self.tool_calls = calls
                    .into_iter()
                    .map(|tc| ToolCall::new(tc.id, tc.function.name, parse_arguments(&tc.function.arguments)))
                    .collect();
                self.requires_action = true;
                Ok(())
            }
            "failed" | "cancelled" | "expired" | "incomplete" => {
                let detail = run
                    .last_error
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .unwrap_or_else(|| "no details".to_string());
                Err(AgentError::oracle(format!("run {}: {}", run.status, detail)))
            }
            _ => Ok(()),
        }
    }

    fn finish(self, thread: &mut AssistantThread) -> LLMResponse {
        thread.pending_run = if self.requires_action { self.run_id } else { None };
        LLMResponse {
            content: self.content,
            tool_calls: self.tool_calls,
            usage: self.usage,
            model: self.model,
        }
    }
}

/// Arguments that are not valid JSON are passed through as a string so the
/// tool can reject them as invalid.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

impl OpenAIClient {
    /// Create a client from configuration, preferring the first matching
    /// config-list entry's endpoint and key
    pub fn from_config(config: &Config, config_list: &ConfigList) -> Result<Self> {
        let entry = config_list.primary();
        let base_url = entry
            .and_then(|e| e.base_url.clone())
            .unwrap_or_else(|| config.oracle.base_url.clone());
        let api_key = entry
            .and_then(|e| e.api_key.clone())
            .unwrap_or_else(|| config.oracle.api_key.clone());

        Self::new(base_url, api_key, Duration::from_secs(config.oracle.timeout_secs))
    }

    /// Create a client for `base_url`
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header(ASSISTANTS_BETA.0, ASSISTANTS_BETA.1)
    }

    async fn create_thread(&self) -> Result<String> {
        let response = self.send(self.post("/threads").json(&serde_json::json!({}))).await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let thread: ThreadObject = response.json().await?;
        debug!(thread = %thread.id, "thread created");
        Ok(thread.id)
    }

    async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let body = ThreadMessageRequest {
            role: "user",
            content,
        };
        let response = self
            .send(self.post(&format!("/threads/{}/messages", thread_id)).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }

    /// Start the next run on `thread`: submit tool outputs to the paused run,
    /// or post the new user messages and create a run
    async fn start_run(
        &self,
        thread: &mut AssistantThread,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: Option<GenerateOptions>,
    ) -> Result<Response> {
        let fresh = thread.undelivered(messages);

        let paused = thread.thread_id.clone().zip(thread.pending_run.clone());
        let request = match paused {
            Some((thread_id, run_id)) => {
                let tool_outputs: Vec<ToolOutput<'_>> = fresh
                    .iter()
                    .filter(|m| m.role == "tool")
                    .filter_map(|m| {
                        m.tool_call_id.as_deref().map(|id| ToolOutput {
                            tool_call_id: id,
                            output: &m.content,
                        })
                    })
                    .collect();
                if tool_outputs.is_empty() {
                    return Err(AgentError::oracle(format!(
                        "run {} is waiting for tool outputs",
                        run_id
                    )));
                }
                debug!(run = %run_id, outputs = tool_outputs.len(), "submitting tool outputs");
                self.post(&format!(
                    "/threads/{}/runs/{}/submit_tool_outputs",
                    thread_id, run_id
                ))
                .json(&SubmitToolOutputsRequest {
                    tool_outputs,
                    stream: true,
                })
            }
            None => {
                let thread_id = match thread.thread_id.clone() {
                    Some(id) => id,
                    None => {
                        let id = self.create_thread().await?;
                        thread.thread_id = Some(id.clone());
                        id
                    }
                };
                // The assistant carries its own instructions and its replies
                // are already on the thread
                for message in fresh.iter().filter(|m| m.role == "user") {
                    self.add_user_message(&thread_id, &message.content).await?;
                }

                let options = options.unwrap_or_default();
                self.post(&format!("/threads/{}/runs", thread_id)).json(&RunRequest {
                    assistant_id: &thread.assistant_id,
                    tools: (!tools.is_empty()).then_some(tools),
                    temperature: options.temperature,
                    max_completion_tokens: options.max_tokens,
                    stream: true,
                })
            }
        };

        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        thread.mark_delivered(messages.len());
        Ok(response)
    }

    /// Read a streamed run to its end, calling `on_token` for each text fragment
    async fn read_run(
        response: Response,
        thread: &mut AssistantThread,
        on_token: Option<&StreamCallback>,
    ) -> Result<LLMResponse> {
        let mut accumulator = RunAccumulator::default();
        let mut decoder = SseDecoder::default();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AgentError::oracle(format!("Stream error: {}", e)))?;
            for event in decoder.push(&chunk)? {
                if let Some(fragment) = accumulator.feed(&event)? {
                    if let Some(on_token) = on_token {
                        on_token(&fragment);
                    }
                }
            }
        }

        if let Some(event) = decoder.finish()? {
            if let Some(fragment) = accumulator.feed(&event)? {
                if let Some(on_token) = on_token {
                    on_token(&fragment);
                }
            }
        }
        if accumulator.run_id.is_none() {
            warn!(thread = ?thread.thread_id, "stream ended without a run event");
        }

        Ok(accumulator.finish(thread))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.authorized(request).send().await.map_err(|e| {
            if e.is_connect() {
                AgentError::oracle(format!("Cannot connect to {}: {}", self.base_url, e))
            } else if e.is_timeout() {
                AgentError::oracle(format!("Request to {} timed out", self.base_url))
            } else {
                AgentError::from(e)
            }
        })
    }

    async fn api_error(response: Response) -> AgentError {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        AgentError::oracle(format!("API error ({}): {}", status, error_text))
    }
}

#[async_trait]
impl LLMProvider for OpenAIClient {
    async fn retrieve_assistant(&self, id: &str) -> Result<Lookup<RemoteAssistant>> {
        let request = self
            .client
            .get(format!("{}/assistants/{}", self.base_url, id))
            .header(ASSISTANTS_BETA.0, ASSISTANTS_BETA.1);
        let response = self.send(request).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Lookup::NotFound);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let assistant: RemoteAssistant = response.json().await?;
        Ok(Lookup::Found(assistant))
    }

    async fn create_assistant(&self, spec: &AssistantSpec) -> Result<RemoteAssistant> {
        let response = self.send(self.post("/assistants").json(spec)).await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let assistant: RemoteAssistant = response.json().await?;
        debug!(id = %assistant.id, name = %spec.name, "assistant created");
        Ok(assistant)
    }

    async fn chat_with_tools(
        &self,
        thread: &mut AssistantThread,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: Option<GenerateOptions>,
    ) -> Result<LLMResponse> {
        let response = self.start_run(thread, messages, tools, options).await?;
        Self::read_run(response, thread, None).await
    }

    async fn chat_stream_with_tools(
        &self,
        thread: &mut AssistantThread,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: Option<GenerateOptions>,
        on_token: StreamCallback,
    ) -> Result<LLMResponse> {
        let response = self.start_run(thread, messages, tools, options).await?;
        Self::read_run(response, thread, Some(&on_token)).await
    }

    fn name(&self) -> &str {
        "openai"
    }
}
