//! Ticketline Shared Types and Utilities
//!
//! This crate contains the domain types, store abstraction and database
//! utilities used by the Ticketline queue server.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use store::{MemoryQueueStore, PgQueueStore, QueueStore};
pub use types::*;
