//! Common types used across Ticketline

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Ticket number handed out to a user.
///
/// Always positive. Unique among the numbers currently in use, recycled once
/// released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketNumber(u32);

impl TicketNumber {
    /// The lowest number the allocator hands out.
    pub const FIRST: TicketNumber = TicketNumber(1);

    /// Returns `None` for zero, which is never a valid ticket.
    pub fn new(value: u32) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    /// The next number up, saturating at `u32::MAX`.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for TicketNumber {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u32::try_from(value)
            .ok()
            .and_then(TicketNumber::new)
            .ok_or(value)
    }
}

impl From<TicketNumber> for i64 {
    fn from(number: TicketNumber) -> Self {
        i64::from(number.0)
    }
}

/// Opaque client-chosen user identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank ids cannot identify anyone
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// Records
// =============================================================================

/// Persistent identity record for a queue user.
///
/// `has_reserved` is true exactly when `number` is set, and the number is then
/// registered as in use by the queue engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub number: Option<TicketNumber>,
    pub has_reserved: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reserved_at: Option<OffsetDateTime>,
}

impl UserRecord {
    /// A freshly registered user holding no reservation
    pub fn idle(id: UserId) -> Self {
        Self {
            id,
            number: None,
            has_reserved: false,
            reserved_at: None,
        }
    }

    /// Mark this user as holding `number` since `at`
    pub fn reserve(&mut self, number: TicketNumber, at: OffsetDateTime) {
        self.number = Some(number);
        self.has_reserved = true;
        self.reserved_at = Some(at);
    }

    /// Drop any reservation, returning the number that was held
    pub fn reset(&mut self) -> Option<TicketNumber> {
        self.has_reserved = false;
        self.reserved_at = None;
        self.number.take()
    }

    /// The held number, if the record is consistently reserved
    pub fn active_number(&self) -> Option<TicketNumber> {
        if self.has_reserved {
            self.number
        } else {
            None
        }
    }
}

/// Queue contents as mirrored to the store.
///
/// Both sequences are kept in queue order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedQueue {
    pub serving: Vec<TicketNumber>,
    pub waiting: Vec<TicketNumber>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(value: u32) -> TicketNumber {
        TicketNumber::new(value).unwrap()
    }

    #[test]
    fn test_ticket_number_rejects_zero() {
        assert!(TicketNumber::new(0).is_none());
        assert_eq!(TicketNumber::new(7).map(i64::from), Some(7));
    }

    #[test]
    fn test_ticket_number_from_database_value() {
        assert_eq!(TicketNumber::try_from(3_i64), Ok(n(3)));
        assert_eq!(TicketNumber::try_from(0_i64), Err(0));
        assert_eq!(TicketNumber::try_from(-4_i64), Err(-4));
        assert_eq!(TicketNumber::try_from(i64::MAX), Err(i64::MAX));
    }

    #[test]
    fn test_ticket_number_ordering() {
        assert!(n(2) < n(10));
        assert_eq!(TicketNumber::FIRST.next(), n(2));
    }

    #[test]
    fn test_user_record_reserve_and_reset() {
        let mut user = UserRecord::idle(UserId::from("alice"));
        assert_eq!(user.active_number(), None);

        let now = OffsetDateTime::now_utc();
        user.reserve(n(4), now);
        assert!(user.has_reserved);
        assert_eq!(user.active_number(), Some(n(4)));
        assert_eq!(user.reserved_at, Some(now));

        assert_eq!(user.reset(), Some(n(4)));
        assert_eq!(user, UserRecord::idle(UserId::from("alice")));
    }

    #[test]
    fn test_user_id_blank() {
        assert!(UserId::from("").is_blank());
        assert!(UserId::from("   ").is_blank());
        assert!(!UserId::from("u-1").is_blank());
    }
}
