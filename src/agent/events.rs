//! Streaming output items
//!
//! A streaming conversation emits these in order; the WebSocket adapter
//! sends each one as a JSON text frame tagged by `type`.

use serde::Serialize;
use serde_json::Value;

use crate::agent::loop_state::ConversationOutcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Text fragment of the assistant reply being generated
    Token { content: String },
    /// Complete assistant reply for one turn
    Assistant { turn: usize, content: String },
    /// The oracle asked for a tool
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    /// Observation fed back for a tool call
    ToolResult {
        id: String,
        name: String,
        ok: bool,
        output: String,
    },
    /// Conversation finished
    Final(ConversationOutcome),
}

impl AgentEvent {
    /// Serialise as a frame; the enum holds only JSON-safe values
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "detail": e.to_string() }).to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::loop_state::Termination;

    #[test]
    fn test_frames_are_tagged() {
        let token = AgentEvent::Token {
            content: "It is".into(),
        };
        assert_eq!(token.to_frame(), r#"{"type":"token","content":"It is"}"#);

        let done = AgentEvent::Final(ConversationOutcome {
            final_message: "It's 15°C. TERMINATE.".into(),
            turns: 3,
            tool_dispatches: 2,
            termination: Termination::Sentinel,
        });
        let frame: Value = serde_json::from_str(&done.to_frame()).unwrap();
        assert_eq!(frame["type"], "final");
        assert_eq!(frame["tool_dispatches"], 2);
        assert_eq!(frame["termination"], "sentinel");
    }
}
