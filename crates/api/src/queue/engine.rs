//! Queue engine actor
//!
//! One task owns the queue, the used-number pool, cached user records and the
//! reservation timers. Connections talk to it through a cloneable
//! [`QueueHandle`]; commands and timer firings are consumed by a single loop,
//! so reserve, complete and expiry never interleave.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ticketline_shared::{QueueStore, TicketNumber, UserId, UserRecord};
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::allocator::NumberPool;
use super::persist::PersistQueue;
use super::state::{Placement, QueueSnapshot, QueueState};
use super::timers::{ReservationTimers, TimerFired};
use crate::config::Config;
use crate::error::{QueueError, QueueResult};
use crate::websocket::{events::ServerEvent, WebSocketState};

/// Pending commands buffered before senders wait
const COMMAND_BUFFER: usize = 1024;

/// Longest a request waits on the store for a user the engine has not cached
pub const USER_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Tunables for the queue engine
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Numbers served at once
    pub serving_capacity: usize,
    /// Time before an uncompleted reservation is released
    pub reservation_grace: Duration,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            serving_capacity: config.serving_capacity,
            reservation_grace: config.reservation_grace,
        }
    }
}

/// A user's view of the queue, sent in reply to `connect`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStatus {
    pub number: Option<TicketNumber>,
    pub current_numbers: Vec<TicketNumber>,
    pub waiting: usize,
}

impl UserStatus {
    pub fn has_reserved(&self) -> bool {
        self.number.is_some()
    }

    pub fn message(&self) -> String {
        match self.number {
            Some(number) => format!(
                "Your number is {number}. There are {} people ahead of you.",
                self.waiting
            ),
            None => "Not reserved yet.".to_string(),
        }
    }
}

/// Internal view of the engine, for health reporting and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineView {
    pub serving: Vec<TicketNumber>,
    pub waiting: Vec<TicketNumber>,
    pub used: Vec<TicketNumber>,
    pub armed_timers: usize,
}

enum Command {
    Connect {
        user_id: UserId,
        stored: Option<UserRecord>,
        reply: oneshot::Sender<QueueResult<UserStatus>>,
    },
    Reserve {
        user_id: UserId,
        stored: Option<UserRecord>,
        reply: oneshot::Sender<QueueResult<TicketNumber>>,
    },
    Complete {
        user_id: UserId,
        stored: Option<UserRecord>,
        reply: oneshot::Sender<QueueResult<TicketNumber>>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    Inspect {
        reply: oneshot::Sender<EngineView>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle for sending requests to the queue engine
///
/// User records the engine may not have cached are read from the store here,
/// on the caller's task, so a slow store never stalls the engine loop.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<Command>,
    store: Arc<dyn QueueStore>,
}

impl QueueHandle {
    /// Register or look up a user and report their queue status
    pub async fn connect(&self, user_id: UserId) -> QueueResult<UserStatus> {
        let stored = self.load_user(&user_id).await;
        self.request(|reply| Command::Connect {
            user_id,
            stored,
            reply,
        })
        .await?
    }

    /// Reserve the lowest free number for a user
    pub async fn reserve(&self, user_id: UserId) -> QueueResult<TicketNumber> {
        let stored = self.load_user(&user_id).await;
        self.request(|reply| Command::Reserve {
            user_id,
            stored,
            reply,
        })
        .await?
    }

    /// Release the user's number; returns the number released
    pub async fn complete(&self, user_id: UserId) -> QueueResult<TicketNumber> {
        let stored = self.load_user(&user_id).await;
        self.request(|reply| Command::Complete {
            user_id,
            stored,
            reply,
        })
        .await?
    }

    /// Public snapshot of the queue
    pub async fn snapshot(&self) -> QueueResult<QueueSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn inspect(&self) -> QueueResult<EngineView> {
        self.request(|reply| Command::Inspect { reply }).await
    }

    /// Wait until all store writes issued so far have been attempted
    pub async fn flush(&self) -> QueueResult<()> {
        self.request(|reply| Command::Flush { reply }).await
    }

    async fn load_user(&self, user_id: &UserId) -> Option<UserRecord> {
        if user_id.is_blank() {
            return None;
        }
        match tokio::time::timeout(USER_LOOKUP_TIMEOUT, self.store.find_user(user_id)).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, user_id = %user_id, "User lookup failed; treating as new");
                None
            }
            Err(_) => {
                tracing::warn!(user_id = %user_id, "User lookup timed out; treating as new");
                None
            }
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> QueueResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| QueueError::EngineUnavailable)?;
        rx.await.map_err(|_| QueueError::EngineUnavailable)
    }
}

pub struct QueueEngine {
    queue: QueueState,
    pool: NumberPool,
    users: HashMap<UserId, UserRecord>,
    timers: ReservationTimers,
    persist: PersistQueue,
    observers: WebSocketState,
    grace: Duration,
}

impl QueueEngine {
    /// Restore state from `store` and start the engine task.
    ///
    /// Fails only if the store cannot be read; that is the one error that
    /// should stop the process.
    pub async fn start(
        store: Arc<dyn QueueStore>,
        observers: WebSocketState,
        settings: EngineSettings,
    ) -> QueueResult<(QueueHandle, JoinHandle<()>)> {
        let persisted = store.load_queue().await?;
        let reserved = store.load_reserved_users().await?;

        let (persist, _writer) = PersistQueue::spawn(Arc::clone(&store));
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();

        let mut engine = QueueEngine {
            queue: QueueState::from_persisted(&persisted, settings.serving_capacity),
            pool: NumberPool::new(),
            users: HashMap::new(),
            timers: ReservationTimers::new(fired_tx),
            persist,
            observers,
            grace: settings.reservation_grace,
        };

        let queue_repaired = engine.queue.to_persisted() != persisted;
        engine.restore(reserved, queue_repaired);

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(engine.run(rx, fired_rx));

        Ok((QueueHandle { tx, store }, task))
    }

    /// Rebuild the used-number pool and timers from reserved users,
    /// reconciling them against the persisted queue.
    fn restore(&mut self, reserved: Vec<UserRecord>, mut queue_dirty: bool) {
        let now = OffsetDateTime::now_utc();
        let mut owners: HashMap<TicketNumber, UserId> = HashMap::new();

        for mut user in reserved {
            let number = match user.active_number() {
                Some(number) if !owners.contains_key(&number) => number,
                _ => {
                    tracing::warn!(
                        user_id = %user.id,
                        number = ?user.number,
                        "Inconsistent reservation in store; resetting user"
                    );
                    user.reset();
                    self.persist.save_user(&user);
                    self.users.insert(user.id.clone(), user);
                    continue;
                }
            };

            if !self.queue.contains(number) {
                tracing::warn!(
                    user_id = %user.id,
                    number = %number,
                    "Reserved number missing from stored queue; re-admitting"
                );
                self.queue.admit(number);
                queue_dirty = true;
            }

            let remaining = remaining_grace(self.grace, user.reserved_at, now);
            self.timers.arm(user.id.clone(), number, remaining);
            owners.insert(number, user.id.clone());
            self.users.insert(user.id.clone(), user);
        }

        let orphans: Vec<TicketNumber> = self
            .queue
            .numbers()
            .filter(|number| !owners.contains_key(number))
            .collect();
        for number in orphans {
            tracing::warn!(number = %number, "Dropping queued number with no owner");
            self.queue.remove_everywhere(number);
            queue_dirty = true;
        }
        if !self.queue.fill_serving().is_empty() {
            queue_dirty = true;
        }

        self.pool = self.queue.numbers().collect();

        if queue_dirty {
            self.persist.save_queue(self.queue.to_persisted());
        }

        tracing::info!(
            serving = self.queue.serving().len(),
            waiting = self.queue.waiting_len(),
            reservations = self.timers.len(),
            "Queue state restored"
        );
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut fired: mpsc::UnboundedReceiver<TimerFired>,
    ) {
        loop {
            tokio::select! {
                biased;

                Some(fired) = fired.recv() => self.expire(fired).await,

                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }

        self.timers.clear();
        self.persist.flush().await;
        tracing::info!("Queue engine stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Connect {
                user_id,
                stored,
                reply,
            } => {
                let _ = reply.send(self.connect(user_id, stored));
            }
            Command::Reserve {
                user_id,
                stored,
                reply,
            } => {
                let _ = reply.send(self.reserve(user_id, stored).await);
            }
            Command::Complete {
                user_id,
                stored,
                reply,
            } => {
                let _ = reply.send(self.complete(user_id, stored).await);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.queue.snapshot());
            }
            Command::Inspect { reply } => {
                let _ = reply.send(EngineView {
                    serving: self.queue.serving().to_vec(),
                    waiting: self.queue.waiting().collect(),
                    used: self.pool.iter().collect(),
                    armed_timers: self.timers.len(),
                });
            }
            Command::Flush { reply } => {
                self.persist.flush().await;
                let _ = reply.send(());
            }
        }
    }

    fn connect(
        &mut self,
        user_id: UserId,
        stored: Option<UserRecord>,
    ) -> QueueResult<UserStatus> {
        validate_user_id(&user_id)?;

        let created = self.lookup_user(&user_id, stored).is_none();
        if created {
            let user = UserRecord::idle(user_id.clone());
            self.persist.save_user(&user);
            self.users.insert(user_id.clone(), user);
            tracing::info!(user_id = %user_id, "Registered new user");
        }

        let number = self
            .users
            .get(&user_id)
            .and_then(UserRecord::active_number);

        // New users are told the length of the waiting line; returning users
        // their position
        let waiting = if created {
            self.queue.waiting_len()
        } else {
            self.queue.waiting_count_for(number)
        };

        Ok(UserStatus {
            number,
            current_numbers: self.queue.serving().to_vec(),
            waiting,
        })
    }

    async fn reserve(
        &mut self,
        user_id: UserId,
        stored: Option<UserRecord>,
    ) -> QueueResult<TicketNumber> {
        validate_user_id(&user_id)?;

        if self.lookup_user(&user_id, stored).is_none() {
            self.users
                .insert(user_id.clone(), UserRecord::idle(user_id.clone()));
        }
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or(QueueError::UnknownUser)?;

        if user.has_reserved {
            tracing::debug!(user_id = %user_id, number = ?user.number, "Reserve rejected: already reserved");
            return Err(QueueError::AlreadyReserved);
        }

        let number = self.pool.allocate();
        self.pool.mark_used(number);
        user.reserve(number, OffsetDateTime::now_utc());
        let placement = self.queue.admit(number);
        self.timers.arm(user_id.clone(), number, self.grace);

        self.persist.save_user(user);
        self.persist.save_queue(self.queue.to_persisted());

        tracing::info!(
            user_id = %user_id,
            number = %number,
            placement = ?placement,
            "Number reserved"
        );

        self.broadcast_snapshot().await;
        Ok(number)
    }

    async fn complete(
        &mut self,
        user_id: UserId,
        stored: Option<UserRecord>,
    ) -> QueueResult<TicketNumber> {
        validate_user_id(&user_id)?;

        if self.lookup_user(&user_id, stored).is_none() {
            return Err(QueueError::UnknownUser);
        }
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or(QueueError::UnknownUser)?;
        let number = user.active_number().ok_or(QueueError::NotReserved)?;

        self.timers.disarm(&user_id);
        user.reset();
        self.pool.release(number);
        let promoted = self.queue.release_and_promote(number);

        self.persist.save_user(user);
        self.persist.save_queue(self.queue.to_persisted());

        tracing::info!(
            user_id = %user_id,
            number = %number,
            promoted = ?promoted,
            "Reservation completed"
        );

        self.broadcast_snapshot().await;
        Ok(number)
    }

    /// Release a reservation whose timer elapsed.
    async fn expire(&mut self, fired: TimerFired) {
        let Some(number) = self.timers.claim(&fired) else {
            return;
        };

        match self.users.get_mut(&fired.user_id) {
            Some(user) if user.active_number() == Some(number) => {
                user.reset();
                self.persist.save_user(user);
            }
            _ => {
                tracing::warn!(
                    user_id = %fired.user_id,
                    number = %number,
                    "Expired timer did not match the user's reservation"
                );
            }
        }

        let promoted = match self.queue.remove_everywhere(number) {
            Some(Placement::Serving) => self.queue.promote_head(),
            _ => None,
        };
        self.pool.release(number);
        self.persist.save_queue(self.queue.to_persisted());

        tracing::info!(
            user_id = %fired.user_id,
            number = %number,
            promoted = ?promoted,
            "Reservation expired"
        );

        self.broadcast_snapshot().await;
    }

    /// Find a user in the cache, falling back to the record the caller read
    /// from the store.
    ///
    /// Every reserved user is cached at boot, so a record only found in the
    /// store must be idle; anything else is reset.
    fn lookup_user(
        &mut self,
        user_id: &UserId,
        stored: Option<UserRecord>,
    ) -> Option<&UserRecord> {
        if !self.users.contains_key(user_id) {
            let mut user = stored.filter(|user| user.id == *user_id)?;
            if user.has_reserved || user.number.is_some() {
                tracing::warn!(
                    user_id = %user_id,
                    number = ?user.number,
                    "Stored reservation unknown to the queue; resetting user"
                );
                user.reset();
                self.persist.save_user(&user);
            }
            self.users.insert(user_id.clone(), user);
        }

        self.users.get(user_id)
    }

    async fn broadcast_snapshot(&self) {
        self.observers
            .broadcast(ServerEvent::from(self.queue.snapshot()))
            .await;
    }
}

fn validate_user_id(user_id: &UserId) -> QueueResult<()> {
    if user_id.is_blank() {
        return Err(QueueError::Protocol("userId must not be empty".to_string()));
    }
    Ok(())
}

/// Grace left for a reservation made at `reserved_at`
fn remaining_grace(
    grace: Duration,
    reserved_at: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Duration {
    let Some(reserved_at) = reserved_at else {
        return grace;
    };
    let elapsed = Duration::try_from(now - reserved_at).unwrap_or(Duration::ZERO);
    grace.saturating_sub(elapsed)
}
