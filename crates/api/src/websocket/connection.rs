//! WebSocket connection management
//!
//! Represents an active WebSocket connection and the user it speaks for.

use std::sync::Arc;
use ticketline_shared::UserId;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::events::ServerEvent;

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    /// User this connection last identified as
    user_id: Arc<RwLock<Option<UserId>>>,
}

impl Connection {
    /// Create a new connection
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            sender,
            user_id: Arc::new(RwLock::new(None)),
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Associate this connection with a user id
    pub async fn bind_user(&self, user_id: &UserId) {
        let mut current = self.user_id.write().await;
        if current.as_ref() != Some(user_id) {
            tracing::debug!(
                session_id = %self.session_id,
                user_id = %user_id,
                "Connection bound to user"
            );
            *current = Some(user_id.clone());
        }
    }

    /// User this connection identified as, if any
    pub async fn user_id(&self) -> Option<UserId> {
        self.user_id.read().await.clone()
    }
}
