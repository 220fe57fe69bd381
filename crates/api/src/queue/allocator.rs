//! Ticket number allocation
//!
//! Hands out the lowest positive number that is not currently in use. The
//! lowest-first rule decides serving order and keeps numbers small and
//! stable across restarts, so it must hold exactly.

use std::collections::BTreeSet;

use ticketline_shared::TicketNumber;

/// Set of ticket numbers currently in use
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumberPool {
    used: BTreeSet<TicketNumber>,
}

impl NumberPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest positive number not in use.
    ///
    /// Does not register the number; call [`NumberPool::mark_used`] once the
    /// caller commits to it.
    pub fn allocate(&self) -> TicketNumber {
        let mut candidate = TicketNumber::FIRST;
        for &used in &self.used {
            if used != candidate {
                break;
            }
            candidate = candidate.next();
        }
        candidate
    }

    /// Register a number as in use. Returns false if it already was.
    pub fn mark_used(&mut self, number: TicketNumber) -> bool {
        self.used.insert(number)
    }

    /// Return a number to the free pool. Returns false if it was not in use.
    pub fn release(&mut self, number: TicketNumber) -> bool {
        self.used.remove(&number)
    }

    #[cfg(test)]
    pub fn contains(&self, number: TicketNumber) -> bool {
        self.used.contains(&number)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TicketNumber> + '_ {
        self.used.iter().copied()
    }
}

impl FromIterator<TicketNumber> for NumberPool {
    fn from_iter<I: IntoIterator<Item = TicketNumber>>(iter: I) -> Self {
        Self {
            used: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(value: u32) -> TicketNumber {
        TicketNumber::new(value).unwrap()
    }

    #[test]
    fn test_allocate_from_empty_pool() {
        let pool = NumberPool::new();
        assert_eq!(pool.allocate(), n(1));
    }

    #[test]
    fn test_allocate_does_not_register() {
        let pool = NumberPool::new();
        assert_eq!(pool.allocate(), n(1));
        assert_eq!(pool.allocate(), n(1));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_allocate_fills_lowest_gap() {
        let mut pool: NumberPool = [1, 2, 4, 5].into_iter().map(n).collect();
        assert_eq!(pool.allocate(), n(3));

        pool.mark_used(n(3));
        assert_eq!(pool.allocate(), n(6));

        pool.release(n(1));
        assert_eq!(pool.allocate(), n(1));
    }

    #[test]
    fn test_allocate_ignores_high_numbers() {
        let pool: NumberPool = [2, 7, 100].into_iter().map(n).collect();
        assert_eq!(pool.allocate(), n(1));
    }

    #[test]
    fn test_allocate_matches_brute_force() {
        // Walk a deterministic sequence of marks and releases, checking the
        // allocator against a linear scan after each step.
        let mut pool = NumberPool::new();
        let mut seed: u32 = 17;
        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let value = n(seed % 40 + 1);
            if seed % 3 == 0 {
                pool.release(value);
            } else {
                pool.mark_used(value);
            }

            let expected = (1..)
                .map(n)
                .find(|candidate| !pool.contains(*candidate))
                .unwrap();
            assert_eq!(pool.allocate(), expected);
        }
    }

    #[test]
    fn test_mark_and_release_report_changes() {
        let mut pool = NumberPool::new();
        assert!(pool.mark_used(n(1)));
        assert!(!pool.mark_used(n(1)));
        assert!(pool.release(n(1)));
        assert!(!pool.release(n(1)));
    }
}
