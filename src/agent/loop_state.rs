//! Agent loop state management
//!
//! Tracks one conversation through its phases, counting oracle turns and
//! tool dispatches and collecting observations.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::ToolResult;

/// Phase of a single conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    Idle,
    ResolvingIdentity,
    CreatingIdentity,
    Conversing,
    ToolDispatch,
    Terminated,
}

/// Why a conversation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The assistant wrote the sentinel
    Sentinel,
    /// The assistant replied without requesting tools
    NoToolCalls,
    /// The turn bound was reached
    MaxTurns,
    /// The caller went away
    Cancelled,
}

/// Result of a finished conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationOutcome {
    pub final_message: String,
    pub turns: usize,
    pub tool_dispatches: usize,
    pub termination: Termination,
}

/// State of the agent reasoning loop
#[derive(Debug, Clone)]
pub struct AgentLoopState {
    /// Oracle turns taken so far
    pub turn: usize,
    /// Maximum allowed turns
    pub max_turns: usize,
    /// Observations collected from tool executions
    pub observations: Vec<Observation>,
    /// Latest assistant content
    pub last_message: String,
    phase: ConversationPhase,
    phases: Vec<ConversationPhase>,
    termination: Option<Termination>,
}

impl AgentLoopState {
    /// Create a new loop state with the given max turns
    pub fn new(max_turns: usize) -> Self {
        Self {
            turn: 0,
            max_turns,
            observations: Vec::new(),
            last_message: String::new(),
            phase: ConversationPhase::Idle,
            phases: vec![ConversationPhase::Idle],
            termination: None,
        }
    }

    pub fn phase(&self) -> ConversationPhase {
        self.phase
    }

    /// Every phase entered so far, in order
    pub fn phases(&self) -> &[ConversationPhase] {
        &self.phases
    }

    /// Move to `phase`
    pub fn enter(&mut self, phase: ConversationPhase) {
        if self.phase == phase {
            return;
        }
        debug!(from = ?self.phase, to = ?phase, turn = self.turn, "conversation phase");
        self.phase = phase;
        self.phases.push(phase);
    }

    /// Check if the loop should continue
    pub fn should_continue(&self) -> bool {
        self.termination.is_none() && self.turn < self.max_turns
    }

    /// Record an assistant reply
    pub fn record_reply(&mut self, content: impl Into<String>) {
        self.turn += 1;
        self.last_message = content.into();
    }

    /// Record a tool dispatch and its result
    pub fn record_dispatch(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    pub fn tool_dispatches(&self) -> usize {
        self.observations.len()
    }

    /// End the conversation
    pub fn terminate(&mut self, reason: Termination) {
        if self.termination.is_none() {
            self.termination = Some(reason);
        }
        self.enter(ConversationPhase::Terminated);
    }

    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Final outcome; a loop that stopped without a reason hit the turn bound
    pub fn outcome(&self) -> ConversationOutcome {
        ConversationOutcome {
            final_message: self.last_message.clone(),
            turns: self.turn,
            tool_dispatches: self.tool_dispatches(),
            termination: self.termination.unwrap_or(Termination::MaxTurns),
        }
    }
}

/// An observation from a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Call this observation answers
    pub call_id: String,
    /// Name of the tool that produced this observation
    pub tool_name: String,
    /// Whether the tool execution was successful
    pub success: bool,
    /// Text fed back to the oracle
    pub output: String,
    /// Optional structured data from the tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Observation {
    /// Observation answering `call_id`
    pub fn from_result(call_id: impl Into<String>, result: &ToolResult) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: result.tool_name.clone(),
            success: result.ok,
            output: result.observation(),
            data: result.data.clone(),
        }
    }
}
