//! Synchronous adapter: one task in, one outcome out.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::agent::{AgentRole, ConversationOutcome};
use crate::core::AgentError;
use crate::server::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    /// Defaults to the configured role
    #[serde(default)]
    pub role: Option<AgentRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResponse {
    pub response: ConversationOutcome,
}

/// Internal failure, reported without detail
pub struct InternalError(AgentError);

impl From<AgentError> for InternalError {
    fn from(err: AgentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for InternalError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "an error occurred while handling the request");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "Internal Server Error" })),
        )
            .into_response()
    }
}

/// `POST /get-web-agent-response`
pub async fn get_web_agent_response(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> Result<Json<PromptResponse>, InternalError> {
    let role = request.role.unwrap_or(state.agent.config().agent.role);
    let outcome = state.agent.run(&request.prompt, role).await?;
    Ok(Json(PromptResponse { response: outcome }))
}
