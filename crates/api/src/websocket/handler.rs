//! WebSocket handler for Axum
//!
//! Handles WebSocket connections and routes client requests to the queue
//! engine.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use tokio::sync::mpsc;

use crate::error::QueueError;
use crate::queue::QueueHandle;
use crate::state::AppState;

use super::{
    connection::Connection,
    events::{ClientEvent, ServerEvent},
};

/// Bytes of an unparseable frame kept in the log
const MAX_LOGGED_FRAME: usize = 256;

/// WebSocket handler - upgrades HTTP connection to WebSocket
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    tracing::debug!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let ws_state = app_state.ws_state.clone();
    let conn = ws_state.add_connection(Connection::new(tx)).await;
    let session_id = conn.session_id;

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_text(&text, &conn, &app_state.queue).await;
            }
            Ok(Message::Close(_)) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            Ok(Message::Binary(_)) => {
                tracing::warn!(session_id = %session_id, "Ignoring binary WebSocket frame");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Axum handles ping/pong automatically
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Cleanup on disconnect. Reservations outlive the socket; the user can
    // reconnect and pick theirs back up.
    tracing::info!(session_id = %session_id, "WebSocket connection closing");
    ws_state.remove_connection(&session_id).await;

    send_task.abort();
}

/// Parse and dispatch one text frame
pub async fn handle_text(text: &str, conn: &Connection, queue: &QueueHandle) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => handle_client_event(event, conn, queue).await,
        Err(e) => {
            tracing::warn!(
                session_id = %conn.session_id,
                error = ?e,
                len = text.len(),
                frame = %frame_preview(text),
                "Failed to parse client event"
            );
            let err = QueueError::Protocol(e.to_string());
            let _ = conn.send(ServerEvent::Error {
                message: err.user_message(),
            });
        }
    }
}

/// Leading part of a frame, cut on a char boundary
fn frame_preview(text: &str) -> &str {
    if text.len() <= MAX_LOGGED_FRAME {
        return text;
    }
    let mut end = MAX_LOGGED_FRAME;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Handle client event
pub async fn handle_client_event(event: ClientEvent, conn: &Connection, queue: &QueueHandle) {
    use ClientEvent::*;

    if let Some(user_id) = event.user_id().filter(|id| !id.is_blank()) {
        conn.bind_user(user_id).await;
    }

    let reply = match event {
        Connect { user_id } => queue.connect(user_id).await.map(ServerEvent::from),
        Reserve { user_id } => queue
            .reserve(user_id)
            .await
            .map(|number| ServerEvent::Reserved { number }),
        Complete { user_id } => queue
            .complete(user_id)
            .await
            .map(|number| ServerEvent::Completed { number }),
        Ping => Ok(ServerEvent::Pong),
    };

    let reply = reply.unwrap_or_else(|e| {
        match &e {
            QueueError::AlreadyReserved | QueueError::NotReserved | QueueError::UnknownUser => {
                tracing::debug!(session_id = %conn.session_id, error = %e, "Request rejected");
            }
            QueueError::Protocol(_) => {
                tracing::warn!(session_id = %conn.session_id, error = %e, "Invalid client request");
            }
            QueueError::EngineUnavailable | QueueError::Store(_) => {
                tracing::error!(session_id = %conn.session_id, error = %e, "Queue request failed");
            }
        }
        ServerEvent::Error {
            message: e.user_message(),
        }
    });

    if conn.send(reply).is_err() {
        tracing::debug!(session_id = %conn.session_id, "Reply dropped; connection closed");
    }
}
