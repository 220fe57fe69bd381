//! Global WebSocket state management
//!
//! Tracks every open connection and fans queue updates out to all of them.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::events::ServerEvent;

/// Global WebSocket state shared across all connections
#[derive(Clone, Default)]
pub struct WebSocketState {
    /// All active connections indexed by session_id
    pub connections: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,
}

impl WebSocketState {
    /// Create new WebSocket state
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let mut connections = self.connections.write().await;
        connections.insert(conn.session_id, Arc::clone(&conn));

        tracing::info!(
            session_id = %conn.session_id,
            total_connections = connections.len(),
            "WebSocket connection added"
        );

        conn
    }

    /// Remove a connection
    pub async fn remove_connection(&self, session_id: &Uuid) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.remove(session_id) {
            let user_id = conn.user_id().await;
            tracing::info!(
                session_id = %session_id,
                user_id = ?user_id,
                remaining_connections = connections.len(),
                "WebSocket connection removed"
            );
        }
    }

    /// Get a connection by session ID
    #[cfg(test)]
    pub async fn get_connection(&self, session_id: &Uuid) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.get(session_id).cloned()
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Broadcast an event to every connection
    ///
    /// Never waits on a client: each connection has an unbounded outbox.
    /// Send errors (closed connections awaiting cleanup) are logged and skipped.
    pub async fn broadcast(&self, event: ServerEvent) {
        let connections = self.connections.read().await;
        let mut success_count = 0;
        let mut failed_count = 0;

        for conn in connections.values() {
            match conn.send(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => {
                    failed_count += 1;
                    tracing::warn!(
                        session_id = %conn.session_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            event_type = ?event,
            recipients = success_count,
            failed = failed_count,
            "Broadcast event to all connections"
        );
    }

    /// Get statistics about the WebSocket state
    pub async fn get_stats(&self) -> WebSocketStats {
        WebSocketStats {
            active_connections: self.connection_count().await,
        }
    }
}

/// Statistics about WebSocket connections
#[derive(Debug, Clone)]
pub struct WebSocketStats {
    /// Number of active connections
    pub active_connections: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_add_and_remove_connection() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn = Connection::new(tx);
        let session_id = conn.session_id;

        // Add connection
        let added_conn = state.add_connection(conn).await;
        assert_eq!(state.connection_count().await, 1);
        assert_eq!(added_conn.session_id, session_id);
        assert!(state.get_connection(&session_id).await.is_some());

        // Remove connection
        state.remove_connection(&session_id).await;
        assert_eq!(state.connection_count().await, 0);
        assert!(state.get_connection(&session_id).await.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_connection() {
        let state = WebSocketState::new();

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        state.add_connection(Connection::new(tx1)).await;
        state.add_connection(Connection::new(tx2)).await;

        state.broadcast(ServerEvent::Pong).await;

        assert_eq!(rx1.try_recv().unwrap(), ServerEvent::Pong);
        assert_eq!(rx2.try_recv().unwrap(), ServerEvent::Pong);
    }

    #[tokio::test]
    async fn test_broadcast_skips_closed_connections() {
        let state = WebSocketState::new();

        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let (open_tx, mut open_rx) = mpsc::unbounded_channel();
        state.add_connection(Connection::new(closed_tx)).await;
        state.add_connection(Connection::new(open_tx)).await;
        drop(closed_rx);

        state.broadcast(ServerEvent::Pong).await;
        assert_eq!(open_rx.try_recv().unwrap(), ServerEvent::Pong);
    }

    #[tokio::test]
    async fn test_stats() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        state.add_connection(Connection::new(tx)).await;

        let stats = state.get_stats().await;
        assert_eq!(stats.active_connections, 1);
    }
}
