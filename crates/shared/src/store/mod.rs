//! Persistent mirror of the queue
//!
//! The in-memory queue engine is the source of truth while the process runs.
//! The store only has to survive restarts: it is loaded once on boot and then
//! kept current by ordered writes.
//!
//! Two implementations are provided:
//! - [`PgQueueStore`] backed by PostgreSQL
//! - [`MemoryQueueStore`] for tests and local runs without a database

mod memory;
mod postgres;

pub use memory::MemoryQueueStore;
pub use postgres::PgQueueStore;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{PersistedQueue, UserId, UserRecord};

#[async_trait]
pub trait QueueStore: Send + Sync + 'static {
    /// Load the last persisted serving and waiting sequences.
    async fn load_queue(&self) -> StoreResult<PersistedQueue>;

    /// Load every user currently holding a reservation.
    async fn load_reserved_users(&self) -> StoreResult<Vec<UserRecord>>;

    /// Look up a single user record.
    async fn find_user(&self, id: &UserId) -> StoreResult<Option<UserRecord>>;

    /// Insert or overwrite a user record.
    async fn upsert_user(&self, user: &UserRecord) -> StoreResult<()>;

    /// Replace both queue sequences with the given snapshot.
    async fn replace_queue(&self, queue: &PersistedQueue) -> StoreResult<()>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> StoreResult<()>;
}
