//! Ticket queue engine
//!
//! - **Allocator**: lowest-free ticket number
//! - **State**: bounded serving window plus FIFO waiting line
//! - **Timers**: per-user reservation expiry
//! - **Persist**: ordered, retried writes to the store mirror
//! - **Engine**: the actor that owns all of the above

pub mod allocator;
pub mod engine;
pub mod persist;
pub mod state;
pub mod timers;

pub use engine::{EngineSettings, EngineView, QueueEngine, QueueHandle, UserStatus};
pub use state::{Placement, QueueSnapshot, QueueState};
