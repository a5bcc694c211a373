//! Streaming adapter over a WebSocket.
//!
//! The first text frame is the task. Every [`AgentEvent`] is then written
//! as a JSON text frame. Closing the socket or sending `cancel` stops the
//! conversation after the in-flight tool call; the browser stays up.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::{Agent, AgentEvent, AgentRole};
use crate::server::AppState;

/// Inbound frame that cancels the running conversation
const CANCEL_FRAME: &str = "cancel";

pub async fn websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.agent))
}

#[derive(Deserialize)]
struct TaskFrame {
    prompt: String,
    #[serde(default)]
    role: Option<AgentRole>,
}

/// Plain text is the task itself; `{"prompt", "role"?}` is also accepted.
fn parse_task(text: &str) -> (String, Option<AgentRole>) {
    match serde_json::from_str::<TaskFrame>(text) {
        Ok(frame) => (frame.prompt, frame.role),
        Err(_) => (text.to_string(), None),
    }
}

async fn handle_socket(socket: WebSocket, agent: Arc<Agent>) {
    let (mut sender, mut receiver) = socket.split();

    let initial = loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => break text.to_string(),
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "websocket closed before a task arrived");
                return;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!(error = %e, "websocket error before a task arrived");
                return;
            }
            None => return,
        }
    };

    let (task, role) = parse_task(&initial);
    let role = role.unwrap_or(agent.config().agent.role);
    info!(role = %role, "received initial message");

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel::<AgentEvent>();

    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) if text.as_str().trim() == CANCEL_FRAME => {
                    info!("client cancelled the conversation");
                    break;
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "websocket closed by client");
                    break;
                }
                Ok(_) => debug!("ignoring inbound frame during conversation"),
                Err(e) => {
                    error!(error = %e, "error receiving message");
                    break;
                }
            }
        }
        reader_cancel.cancel();
    });

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        let mut events = UnboundedReceiverStream::new(rx);
        while let Some(event) = events.next().await {
            if sender.send(Message::Text(event.to_frame().into())).await.is_err() {
                warn!("websocket send failed, cancelling conversation");
                writer_cancel.cancel();
                break;
            }
        }
        let _ = sender.close().await;
    });

    if let Err(e) = agent.run_streaming(&task, role, tx, cancel).await {
        error!(error = %e, "streaming conversation failed");
    }

    // All senders are gone once the run returns; the writer drains and closes
    if let Err(e) = writer.await {
        error!(error = %e, "websocket writer task failed");
    }
    reader.abort();
}
