//! Ticketline API Library
//!
//! Real-time ticket queue served over WebSocket, with a few HTTP endpoints
//! for health checks and read-only queue inspection.

pub mod config;
pub mod error;
pub mod queue;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult, QueueError, QueueResult};
pub use queue::{QueueEngine, QueueHandle};
pub use state::AppState;
