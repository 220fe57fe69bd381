//! Shared application state

use std::sync::Arc;

use ticketline_shared::QueueStore;

use crate::config::Config;
use crate::queue::QueueHandle;
use crate::websocket::WebSocketState;

/// State handed to every Axum handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Handle to the queue engine task
    pub queue: QueueHandle,
    pub ws_state: WebSocketState,
    /// Backing store, used directly only for health probes
    pub store: Arc<dyn QueueStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        queue: QueueHandle,
        ws_state: WebSocketState,
        store: Arc<dyn QueueStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            queue,
            ws_state,
            store,
        }
    }
}
