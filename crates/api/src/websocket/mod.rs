//! WebSocket support for the live queue
//!
//! # Architecture
//!
//! - **Connection**: One open socket and the user it last identified as
//! - **State**: Global WebSocket state shared across all connections
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: Type-safe event definitions for client/server communication

pub mod connection;
pub mod events;
pub mod handler;
pub mod state;

pub use handler::ws_handler;
pub use state::WebSocketState;
