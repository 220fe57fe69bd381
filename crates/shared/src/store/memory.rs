//! In-memory queue store for single-process runs and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::QueueStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{PersistedQueue, UserId, UserRecord};

#[derive(Debug, Default)]
struct InnerState {
    queue: PersistedQueue,
    users: HashMap<UserId, UserRecord>,
}

/// Queue store kept in process memory.
///
/// Clones share the same underlying state, so a test can keep one handle
/// and inspect what the engine wrote through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueStore {
    state: Arc<RwLock<InnerState>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store as if a previous process had persisted this state.
    pub async fn seed(&self, queue: PersistedQueue, users: Vec<UserRecord>) {
        let mut state = self.state.write().await;
        state.queue = queue;
        state.users = users.into_iter().map(|u| (u.id.clone(), u)).collect();
    }

    /// Make every subsequent write fail until switched back off.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of user records held
    pub async fn user_count(&self) -> usize {
        self.state.read().await.users.len()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn load_queue(&self) -> StoreResult<PersistedQueue> {
        Ok(self.state.read().await.queue.clone())
    }

    async fn load_reserved_users(&self) -> StoreResult<Vec<UserRecord>> {
        let state = self.state.read().await;
        let mut users: Vec<UserRecord> = state
            .users
            .values()
            .filter(|u| u.has_reserved)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.reserved_at.cmp(&b.reserved_at).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn find_user(&self, id: &UserId) -> StoreResult<Option<UserRecord>> {
        Ok(self.state.read().await.users.get(id).cloned())
    }

    async fn upsert_user(&self, user: &UserRecord) -> StoreResult<()> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        state.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn replace_queue(&self, queue: &PersistedQueue) -> StoreResult<()> {
        self.check_writable()?;
        let mut state = self.state.write().await;
        state.queue = queue.clone();
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_writable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TicketNumber;
    use time::OffsetDateTime;

    fn n(value: u32) -> TicketNumber {
        TicketNumber::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_load_reserved_users_filters_idle() {
        let store = MemoryQueueStore::new();
        let mut alice = UserRecord::idle(UserId::from("alice"));
        alice.reserve(n(1), OffsetDateTime::now_utc());
        let bob = UserRecord::idle(UserId::from("bob"));

        store.upsert_user(&alice).await.unwrap();
        store.upsert_user(&bob).await.unwrap();

        let reserved = store.load_reserved_users().await.unwrap();
        assert_eq!(reserved, vec![alice]);
        assert_eq!(store.user_count().await, 2);
    }

    #[tokio::test]
    async fn test_replace_queue_overwrites_previous_snapshot() {
        let store = MemoryQueueStore::new();
        store
            .replace_queue(&PersistedQueue {
                serving: vec![n(1), n(2)],
                waiting: vec![n(3)],
            })
            .await
            .unwrap();
        store
            .replace_queue(&PersistedQueue {
                serving: vec![n(2)],
                waiting: vec![],
            })
            .await
            .unwrap();

        let queue = store.load_queue().await.unwrap();
        assert_eq!(queue.serving, vec![n(2)]);
        assert!(queue.waiting.is_empty());
    }

    #[tokio::test]
    async fn test_failed_writes_leave_state_untouched() {
        let store = MemoryQueueStore::new();
        store.set_fail_writes(true);

        let result = store.upsert_user(&UserRecord::idle(UserId::from("carol"))).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.user_count().await, 0);

        store.set_fail_writes(false);
        store
            .upsert_user(&UserRecord::idle(UserId::from("carol")))
            .await
            .unwrap();
        assert_eq!(store.user_count().await, 1);
    }
}
