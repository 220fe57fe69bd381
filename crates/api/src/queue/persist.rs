//! Ordered store writer
//!
//! Store writes are issued fire-and-forget from the engine but applied by a
//! single task in the order they were enqueued, so the store always reflects
//! some prefix of the engine's mutation history. Transient failures are
//! retried with exponential backoff; a write that still fails is logged and
//! dropped, leaving the in-memory state authoritative.

use std::sync::Arc;
use std::time::Duration;

use ticketline_shared::{PersistedQueue, QueueStore, StoreError, StoreResult, UserRecord};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

/// Base delay for write retries
const RETRY_BASE_DELAY: Duration = Duration::from_millis(10);
/// Maximum delay between write retries
const RETRY_MAX_DELAY: Duration = Duration::from_secs(1);
/// Retries after the first attempt
const MAX_RETRIES: usize = 3;

#[derive(Debug)]
enum PersistOp {
    User(UserRecord),
    Queue(PersistedQueue),
    Flush(oneshot::Sender<()>),
}

/// Handle for enqueueing store writes
#[derive(Debug, Clone)]
pub struct PersistQueue {
    tx: mpsc::UnboundedSender<PersistOp>,
}

impl PersistQueue {
    /// Spawn the writer task for `store`.
    ///
    /// The task exits once every handle has been dropped and the backlog is
    /// written.
    pub fn spawn(store: Arc<dyn QueueStore>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_writer(store, rx));
        (Self { tx }, task)
    }

    pub fn save_user(&self, user: &UserRecord) {
        self.enqueue(PersistOp::User(user.clone()));
    }

    pub fn save_queue(&self, queue: PersistedQueue) {
        self.enqueue(PersistOp::Queue(queue));
    }

    /// Wait until every write enqueued before this call has been attempted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.enqueue(PersistOp::Flush(tx));
        let _ = rx.await;
    }

    fn enqueue(&self, op: PersistOp) {
        if self.tx.send(op).is_err() {
            tracing::error!("Store writer has stopped; dropping write");
        }
    }
}

async fn run_writer(store: Arc<dyn QueueStore>, mut rx: mpsc::UnboundedReceiver<PersistOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            PersistOp::User(user) => {
                let result = with_retry(|| store.upsert_user(&user)).await;
                if let Err(e) = result {
                    tracing::error!(
                        error = %e,
                        user_id = %user.id,
                        "Store write failure: user record not persisted"
                    );
                }
            }
            PersistOp::Queue(queue) => {
                let result = with_retry(|| store.replace_queue(&queue)).await;
                if let Err(e) = result {
                    tracing::error!(
                        error = %e,
                        serving = queue.serving.len(),
                        waiting = queue.waiting.len(),
                        "Store write failure: queue snapshot not persisted"
                    );
                }
            }
            PersistOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    tracing::debug!("Store writer stopped");
}

async fn with_retry<F, Fut>(mut write: F) -> StoreResult<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = StoreResult<()>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY.as_millis() as u64)
        .max_delay(RETRY_MAX_DELAY)
        .take(MAX_RETRIES)
        .map(jitter);

    // Permanent errors are wrapped in Ok to stop retrying
    let outcome: Result<StoreResult<()>, StoreError> = Retry::spawn(retry_strategy, || {
        let attempt = write();
        async move {
            match attempt.await {
                Ok(()) => Ok(Ok(())),
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "Transient store error - will retry");
                    Err(e)
                }
                Err(e) => Ok(Err(e)),
            }
        }
    })
    .await;

    outcome.unwrap_or_else(Err)
}
