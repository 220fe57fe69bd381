//! Serving window and waiting line
//!
//! Active numbers are partitioned into a bounded `serving` window and an
//! unbounded FIFO `waiting` line. A number is in at most one of the two, and
//! `serving` never grows beyond its capacity.

use std::collections::VecDeque;

use serde::Serialize;
use ticketline_shared::{PersistedQueue, TicketNumber};

/// Where an admitted number was placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Serving,
    Waiting,
}

/// Public view of the queue broadcast to every observer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub current_numbers: Vec<TicketNumber>,
    pub waiting: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueState {
    capacity: usize,
    serving: Vec<TicketNumber>,
    waiting: VecDeque<TicketNumber>,
}

impl QueueState {
    /// Create an empty queue serving at most `capacity` numbers at once
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            serving: Vec::with_capacity(capacity),
            waiting: VecDeque::new(),
        }
    }

    /// Rebuild from a persisted snapshot.
    ///
    /// Duplicates are dropped (first occurrence wins) and any serving overflow
    /// beyond `capacity` goes back to the front of the waiting line, so a
    /// lowered capacity still yields a valid queue.
    pub fn from_persisted(persisted: &PersistedQueue, capacity: usize) -> Self {
        let mut state = Self::new(capacity);
        let mut overflow = Vec::new();

        for &number in &persisted.serving {
            if state.contains(number) || overflow.contains(&number) {
                continue;
            }
            if state.serving.len() < state.capacity {
                state.serving.push(number);
            } else {
                overflow.push(number);
            }
        }

        for &number in &persisted.waiting {
            if state.contains(number) || overflow.contains(&number) {
                continue;
            }
            state.waiting.push_back(number);
        }

        for number in overflow.into_iter().rev() {
            state.waiting.push_front(number);
        }

        state.fill_serving();
        state
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn serving(&self) -> &[TicketNumber] {
        &self.serving
    }

    pub fn waiting(&self) -> impl ExactSizeIterator<Item = TicketNumber> + '_ {
        self.waiting.iter().copied()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Total numbers in the system
    pub fn len(&self) -> usize {
        self.serving.len() + self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, number: TicketNumber) -> bool {
        self.serving.contains(&number) || self.waiting.contains(&number)
    }

    /// Place a new number: into `serving` while there is room, otherwise at
    /// the back of `waiting`.
    pub fn admit(&mut self, number: TicketNumber) -> Placement {
        debug_assert!(!self.contains(number), "number admitted twice");

        if self.serving.len() < self.capacity {
            self.serving.push(number);
            Placement::Serving
        } else {
            self.waiting.push_back(number);
            Placement::Waiting
        }
    }

    /// Release a finished number and promote the head of `waiting` into the
    /// freed slot.
    ///
    /// Releasing a number that is not present is a no-op. A number still in
    /// `waiting` is removed from there; no serving slot opens in that case.
    /// Returns the promoted number, if any.
    pub fn release_and_promote(&mut self, number: TicketNumber) -> Option<TicketNumber> {
        match self.remove_everywhere(number) {
            Some(Placement::Serving) => self.promote_head(),
            Some(Placement::Waiting) | None => None,
        }
    }

    /// Remove a number from whichever sequence holds it, without promoting.
    pub fn remove_everywhere(&mut self, number: TicketNumber) -> Option<Placement> {
        if let Some(index) = self.serving.iter().position(|n| *n == number) {
            self.serving.remove(index);
            return Some(Placement::Serving);
        }
        if let Some(index) = self.waiting.iter().position(|n| *n == number) {
            self.waiting.remove(index);
            return Some(Placement::Waiting);
        }
        None
    }

    /// Move the head of `waiting` into `serving` if a slot is free.
    pub fn promote_head(&mut self) -> Option<TicketNumber> {
        if self.serving.len() >= self.capacity {
            return None;
        }
        let head = self.waiting.pop_front()?;
        self.serving.push(head);
        Some(head)
    }

    /// Promote until `serving` is full or `waiting` is empty.
    pub fn fill_serving(&mut self) -> Vec<TicketNumber> {
        let mut promoted = Vec::new();
        while let Some(number) = self.promote_head() {
            promoted.push(number);
        }
        promoted
    }

    /// How many numbers are ahead of `number` in line.
    ///
    /// A number not in the system counts as last in line.
    pub fn waiting_count_for(&self, number: Option<TicketNumber>) -> usize {
        number
            .and_then(|number| {
                self.serving
                    .iter()
                    .chain(self.waiting.iter())
                    .position(|n| *n == number)
            })
            .unwrap_or_else(|| self.len())
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current_numbers: self.serving.clone(),
            waiting: self.waiting.len(),
        }
    }

    pub fn to_persisted(&self) -> PersistedQueue {
        PersistedQueue {
            serving: self.serving.clone(),
            waiting: self.waiting.iter().copied().collect(),
        }
    }

    /// Every number currently in the system
    pub fn numbers(&self) -> impl Iterator<Item = TicketNumber> + '_ {
        self.serving.iter().chain(self.waiting.iter()).copied()
    }
}
