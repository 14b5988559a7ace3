//! Stored value of a single counter: a watermark-based ticket allocator.
//!
//! An entry covers the contiguous range `[low, high]` of issued tickets and
//! counts how many of them are still outstanding. `{0, 0, 0}` is the empty
//! entry; any mutation leaving `high < low` collapses back to it. A single
//! outstanding ticket is `low == high`.

use serde::{Deserialize, Serialize};

/// Positional record `(low, high, number)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterEntry {
    pub low: i64,
    pub high: i64,
    pub number: i64,
}

impl CounterEntry {
    pub const EMPTY: CounterEntry = CounterEntry {
        low: 0,
        high: 0,
        number: 0,
    };

    pub const fn new(low: i64, high: i64, number: i64) -> Self {
        Self { low, high, number }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Issue the next ticket and return it.
    ///
    /// The first increment from empty sets the floor to 1.
    pub fn increment(&mut self) -> i64 {
        self.high += 1;
        if self.low == 0 {
            self.low = 1;
        }
        self.number += 1;
        self.high
    }

    /// Give back ticket `ticket`.
    ///
    /// Shrinks `high` if it is the top ticket, otherwise `low` if it is the
    /// bottom one. Tickets in the middle only reduce the outstanding count.
    pub fn rollback(&mut self, ticket: i64) {
        self.number -= 1;
        if self.high == ticket {
            self.high -= 1;
        } else if self.low == ticket {
            self.low += 1;
        }
        if self.high < self.low {
            *self = Self::EMPTY;
        }
    }

    /// Fold another entry's baseline into this one: adopt its floor and
    /// subtract its outstanding count. `number` is not clamped.
    pub fn remold(&mut self, other: &CounterEntry) {
        self.low = other.low;
        self.number -= other.number;
        if self.high < self.low {
            *self = Self::EMPTY;
        }
    }

    /// Overwrite with `other`.
    pub fn replace(&mut self, other: &CounterEntry) {
        *self = *other;
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Lenient decode: absent or undecodable values read as empty.
    pub fn from_stored(bytes: Option<&[u8]>) -> Self {
        bytes
            .and_then(|b| bincode::deserialize(b).ok())
            .unwrap_or(Self::EMPTY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let mut e = CounterEntry::default();
        assert!(e.is_empty());

        assert_eq!(e.increment(), 1);
        assert_eq!(e, CounterEntry::new(1, 1, 1));

        assert_eq!(e.increment(), 2);
        assert_eq!(e, CounterEntry::new(1, 2, 2));

        e.rollback(2);
        assert_eq!(e, CounterEntry::new(1, 1, 1));

        // high == 1 matches first, then high < low collapses.
        e.rollback(1);
        assert_eq!(e, CounterEntry::EMPTY);
    }

    #[test]
    fn test_increment_keeps_existing_floor() {
        let mut e = CounterEntry::new(5, 9, 2);
        assert_eq!(e.increment(), 10);
        assert_eq!(e, CounterEntry::new(5, 10, 3));
    }

    #[test]
    fn test_rollback_low_ticket() {
        let mut e = CounterEntry::new(1, 5, 5);
        e.rollback(1);
        assert_eq!(e, CounterEntry::new(2, 5, 4));
    }

    #[test]
    fn test_rollback_middle_ticket() {
        let mut e = CounterEntry::new(1, 5, 5);
        e.rollback(3);
        assert_eq!(e, CounterEntry::new(1, 5, 4));
    }

    #[test]
    fn test_rollback_collapse_discards_number() {
        let mut e = CounterEntry::new(3, 3, 7);
        e.rollback(3);
        assert_eq!(e, CounterEntry::EMPTY);
    }

    #[test]
    fn test_rollback_to_single_ticket_keeps_range() {
        let mut e = CounterEntry::new(3, 4, 7);
        e.rollback(4);
        assert_eq!(e, CounterEntry::new(3, 3, 6));
    }

    #[test]
    fn test_remold() {
        let mut e = CounterEntry::new(1, 10, 6);
        e.remold(&CounterEntry::new(4, 8, 2));
        assert_eq!(e, CounterEntry::new(4, 10, 4));

        let mut e = CounterEntry::new(1, 3, 1);
        e.remold(&CounterEntry::new(1, 3, 5));
        assert_eq!(e, CounterEntry::new(1, 3, -4));

        let mut e = CounterEntry::new(1, 3, 2);
        e.remold(&CounterEntry::new(3, 3, 0));
        assert_eq!(e, CounterEntry::new(3, 3, 2));

        let mut e = CounterEntry::new(1, 3, 2);
        e.remold(&CounterEntry::new(4, 6, 0));
        assert_eq!(e, CounterEntry::EMPTY);
    }

    #[test]
    fn test_replace() {
        let mut e = CounterEntry::new(1, 2, 3);
        e.replace(&CounterEntry::new(7, 8, 9));
        assert_eq!(e, CounterEntry::new(7, 8, 9));
    }

    #[test]
    fn test_lenient_decode() {
        assert_eq!(CounterEntry::from_stored(None), CounterEntry::EMPTY);
        assert_eq!(CounterEntry::from_stored(Some(&[1, 2])), CounterEntry::EMPTY);

        let bytes = CounterEntry::new(1, 5, 3).to_bytes().unwrap();
        assert_eq!(bytes.len(), 24);
        assert_eq!(
            CounterEntry::from_stored(Some(&bytes)),
            CounterEntry::new(1, 5, 3)
        );
    }
}
