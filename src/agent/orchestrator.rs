//! Agent orchestrator
//!
//! Drives one conversation at a time: resolve the role's assistant, then
//! alternate oracle turns and sequential tool dispatch until the assistant
//! writes the sentinel, stops calling tools, or the turn bound is reached.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::conversation::Conversation;
use crate::agent::events::AgentEvent;
use crate::agent::identity::{FileIdentityStore, IdentityResolver, IdentityStore};
use crate::agent::loop_state::{
    AgentLoopState, ConversationOutcome, ConversationPhase, Observation, Termination,
};
use crate::agent::roles::AgentRole;
use crate::core::{
    AgentError, Config, ConfigList, FailureKind, Result, ToolCall, ToolDefinition, ToolResult,
};
use crate::llm::{AssistantThread, GenerateOptions, LLMProvider, LLMResponse, OpenAIClient};
use crate::tools::browser::{BrowserManager, ChromiumLauncher};
use crate::tools::{ToolName, ToolRegistry};

/// Main agent that orchestrates the oracle and tools
pub struct Agent {
    /// Configuration
    config: Config,
    /// Oracle client
    llm: Arc<dyn LLMProvider>,
    identities: IdentityResolver,
    /// Tool registry; owns the browser manager handle
    tools: Arc<ToolRegistry>,
    /// Held for the whole of a conversation
    gate: Mutex<()>,
}

impl Agent {
    /// Create an agent from its collaborators
    pub fn new(
        config: Config,
        llm: Arc<dyn LLMProvider>,
        identity_store: Arc<dyn IdentityStore>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let identities = IdentityResolver::new(
            Arc::clone(&llm),
            identity_store,
            config.oracle.model.clone(),
            config.agent.termination_sentinel.clone(),
        );

        Self {
            config,
            llm,
            identities,
            tools,
            gate: Mutex::new(()),
        }
    }

    /// Production wiring: OpenAI client, file identity store, Chromium
    pub fn from_config(config: Config) -> Result<Self> {
        let config_list = ConfigList::load_and_enrich(
            config.oracle.config_list_path.as_deref(),
            &config.oracle.model,
            &config.oracle.api_key,
        );
        let llm: Arc<dyn LLMProvider> = Arc::new(OpenAIClient::from_config(&config, &config_list)?);
        let store: Arc<dyn IdentityStore> =
            Arc::new(FileIdentityStore::new(config.identity_store_path()));
        let browser = Arc::new(BrowserManager::new(
            config.browser.clone(),
            Arc::new(ChromiumLauncher),
        ));
        let tools = Arc::new(ToolRegistry::from_config(&config, browser));

        Ok(Self::new(config, llm, store, tools))
    }

    /// Get current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Browser session owner shared by every conversation
    pub fn browser(&self) -> &Arc<BrowserManager> {
        self.tools.browser()
    }

    /// Run `task` to completion and return the outcome
    pub async fn run(&self, task: &str, role: AgentRole) -> Result<ConversationOutcome> {
        self.drive(task, role, None, &CancellationToken::new()).await
    }

    /// Run `task`, emitting each step on `events`.
    ///
    /// Cancelling `cancel` stops the loop once the in-flight tool call
    /// finishes; no further oracle turns or tool calls are issued.
    pub async fn run_streaming(
        &self,
        task: &str,
        role: AgentRole,
        events: UnboundedSender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Result<ConversationOutcome> {
        self.drive(task, role, Some(&events), &cancel).await
    }

    async fn drive(
        &self,
        task: &str,
        role: AgentRole,
        events: Option<&UnboundedSender<AgentEvent>>,
        cancel: &CancellationToken,
    ) -> Result<ConversationOutcome> {
        let _conversation = self.gate.lock().await;
        let mut state = AgentLoopState::new(self.config.agent.max_turns);
        let tools = self.tools.definitions_for(role.allowed_tools());

        info!(role = %role, max_turns = state.max_turns, "starting conversation");

        let identity = self
            .identities
            .resolve(role, &tools, &mut state)
            .await
            .inspect_err(|e| error!(role = %role, error = %e, "failed to resolve assistant"))?;

        if role.uses_browser() {
            self.browser().acquire().await?;
        }

        let mut conversation = Conversation::new();
        conversation.set_system_prompt(&identity.instructions);
        conversation.add_user(task);
        let mut thread = AssistantThread::new(identity.remote_id.clone());

        let sentinel = self.config.agent.termination_sentinel.as_str();

        while state.should_continue() {
            if cancel.is_cancelled() {
                state.terminate(Termination::Cancelled);
                break;
            }

            state.enter(ConversationPhase::Conversing);
            let response = self.call_oracle(&mut thread, &conversation, &tools, events).await?;
            state.record_reply(response.content.clone());
            conversation.add_assistant(&response.content, response.tool_calls.clone());

            if !response.content.is_empty() {
                emit(
                    events,
                    AgentEvent::Assistant {
                        turn: state.turn,
                        content: response.content.clone(),
                    },
                );
            }

            if response.content.contains(sentinel) {
                state.terminate(Termination::Sentinel);
                break;
            }
            if response.tool_calls.is_empty() {
                state.terminate(Termination::NoToolCalls);
                break;
            }

            state.enter(ConversationPhase::ToolDispatch);
            for call in &response.tool_calls {
                if cancel.is_cancelled() {
                    break;
                }

                emit(
                    events,
                    AgentEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                );

                let result = self.dispatch(role, call).await;
                let observation = Observation::from_result(&call.id, &result);

                emit(
                    events,
                    AgentEvent::ToolResult {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        ok: observation.success,
                        output: observation.output.clone(),
                    },
                );

                conversation.add_tool_result(&call.id, observation.output.clone());
                state.record_dispatch(observation);
            }
        }

        if state.termination().is_none() {
            warn!(turns = state.turn, "turn limit reached before the task finished");
            state.terminate(Termination::MaxTurns);
        }

        let outcome = state.outcome();
        info!(
            turns = outcome.turns,
            tool_dispatches = outcome.tool_dispatches,
            termination = ?outcome.termination,
            "conversation finished"
        );
        emit(events, AgentEvent::Final(outcome.clone()));
        Ok(outcome)
    }

    /// Ask the resolved assistant for its next turn
    async fn call_oracle(
        &self,
        thread: &mut AssistantThread,
        conversation: &Conversation,
        tools: &[ToolDefinition],
        events: Option<&UnboundedSender<AgentEvent>>,
    ) -> Result<LLMResponse> {
        let messages = conversation.get_messages();
        let options = Some(GenerateOptions {
            temperature: Some(self.config.agent.temperature),
            ..Default::default()
        });

        let response = match events {
            Some(events) => {
                let events = events.clone();
                self.llm
                    .chat_stream_with_tools(
                        thread,
                        &messages,
                        tools,
                        options,
                        Box::new(move |token| {
                            let _ = events.send(AgentEvent::Token {
                                content: token.to_string(),
                            });
                        }),
                    )
                    .await
            }
            None => self.llm.chat_with_tools(thread, &messages, tools, options).await,
        };

        response.map_err(|e| {
            error!(
                provider = self.llm.name(),
                assistant = %thread.assistant_id,
                error = %e,
                "oracle call failed"
            );
            match e {
                AgentError::Oracle(_) => e,
                other => AgentError::oracle(other.to_string()),
            }
        })
    }

    /// Execute one tool call. A dead page is replaced and the same call is
    /// retried exactly once.
    async fn dispatch(&self, role: AgentRole, call: &ToolCall) -> ToolResult {
        if let Ok(name) = call.name.parse::<ToolName>() {
            if !role.allows(name) {
                warn!(role = %role, tool = %name, "tool not available to role");
                return ToolResult::failure(
                    &call.name,
                    FailureKind::UnknownTool,
                    format!("tool {} is not available to {}", name, role),
                );
            }
        }

        let result = self.tools.execute(call).await;
        if !result.is_page_unavailable() {
            return result;
        }

        warn!(tool = %call.name, "page unavailable, resetting page and retrying once");
        match self.browser().reset_page().await {
            Ok(_) => self.tools.execute(call).await,
            Err(e) => {
                error!(tool = %call.name, error = %e, "page reset failed");
                ToolResult::failure(
                    &call.name,
                    FailureKind::PageUnavailable,
                    format!("page unavailable and reset failed: {}", e),
                )
            }
        }
    }
}

fn emit(events: Option<&UnboundedSender<AgentEvent>>, event: AgentEvent) {
    if let Some(events) = events {
        // A closed receiver means the client left; cancellation handles that
        let _ = events.send(event);
    }
}
