//! Reservation expiry timers
//!
//! Every reservation gets a one-shot timer. When it elapses without the user
//! completing, the engine releases the number as if the user had completed.
//!
//! Timers do not touch queue state themselves: a firing is reported over a
//! channel and handled inside the engine loop, and the engine only acts on it
//! after [`ReservationTimers::claim`] confirms the timer is still the live one.

use std::collections::HashMap;
use std::time::Duration;

use ticketline_shared::{TicketNumber, UserId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Notification that a reservation timer elapsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub user_id: UserId,
    pub token: u64,
}

#[derive(Debug)]
struct ArmedTimer {
    token: u64,
    number: TicketNumber,
    task: JoinHandle<()>,
}

/// Registry of live reservation timers, at most one per user
#[derive(Debug)]
pub struct ReservationTimers {
    entries: HashMap<UserId, ArmedTimer>,
    next_token: u64,
    fired: mpsc::UnboundedSender<TimerFired>,
}

impl ReservationTimers {
    pub fn new(fired: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            entries: HashMap::new(),
            next_token: 0,
            fired,
        }
    }

    /// Schedule expiry of `user_id`'s reservation of `number` after `delay`.
    ///
    /// A timer already armed for the user is disarmed first.
    pub fn arm(&mut self, user_id: UserId, number: TicketNumber, delay: Duration) {
        self.disarm(&user_id);

        self.next_token += 1;
        let token = self.next_token;
        let fired = self.fired.clone();
        let fired_user = user_id.clone();
        // Deadline is fixed now, not when the task first gets polled
        let sleep = tokio::time::sleep(delay);

        let task = tokio::spawn(async move {
            sleep.await;
            // The engine may already be gone during shutdown
            let _ = fired.send(TimerFired {
                user_id: fired_user,
                token,
            });
        });

        tracing::debug!(
            user_id = %user_id,
            number = %number,
            delay_secs = delay.as_secs(),
            "Reservation timer armed"
        );

        self.entries.insert(user_id, ArmedTimer { token, number, task });
    }

    /// Cancel and forget the user's timer. Idempotent.
    pub fn disarm(&mut self, user_id: &UserId) -> Option<TicketNumber> {
        let entry = self.entries.remove(user_id)?;
        entry.task.abort();
        tracing::debug!(
            user_id = %user_id,
            number = %entry.number,
            "Reservation timer disarmed"
        );
        Some(entry.number)
    }

    /// Accept a firing if it belongs to the user's live timer.
    ///
    /// Removes the entry and returns the reserved number. A firing from a
    /// timer that was disarmed or replaced returns `None`.
    pub fn claim(&mut self, fired: &TimerFired) -> Option<TicketNumber> {
        match self.entries.get(&fired.user_id) {
            Some(entry) if entry.token == fired.token => {
                self.entries.remove(&fired.user_id).map(|entry| entry.number)
            }
            _ => {
                tracing::debug!(
                    user_id = %fired.user_id,
                    token = fired.token,
                    "Ignoring stale reservation timer"
                );
                None
            }
        }
    }

    #[cfg(test)]
    pub fn is_armed(&self, user_id: &UserId) -> bool {
        self.entries.contains_key(user_id)
    }

    /// Number of live timers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Abort every live timer
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.task.abort();
        }
    }
}

impl Drop for ReservationTimers {
    fn drop(&mut self) {
        self.clear();
    }
}
