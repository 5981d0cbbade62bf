//! Time utilities for the ledger.

use chrono::{DateTime, Utc};

use crate::error::{LedgerError, Result};

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Closed time interval used for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: Timestamp,
    end: Timestamp,
}

impl TimeRange {
    /// Create a range; `start` must not be after `end`.
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self> {
        if start > end {
            return Err(LedgerError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Check if a timestamp falls inside the range, both ends included.
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use chrono::Duration;

    #[test]
    fn test_range_contains() {
        let start = now();
        let end = start + Duration::seconds(10);
        let range = TimeRange::new(start, end).unwrap();

        assert!(range.contains(start));
        assert!(range.contains(end));
        assert!(range.contains(start + Duration::seconds(5)));
        assert!(!range.contains(end + Duration::milliseconds(1)));
    }

    #[test]
    fn test_empty_range_is_valid() {
        let instant = now();
        assert!(TimeRange::new(instant, instant).is_ok());
    }

    #[test]
    fn test_inverted_range() {
        let start = now();
        let end = start - Duration::seconds(1);
        let err = TimeRange::new(start, end).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
    }
}
