//! Identifier types for ledger entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Public, opaque account number handed out to account holders.
///
/// Ordering is lexicographic; lock acquisition relies on it to take
/// multiple accounts in a fixed global order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Create a new account number.
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Get the number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check the number is usable as a key.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.len() <= 64 && !self.0.chars().any(char::is_whitespace)
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountNumber {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccountNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Internal surrogate key of an account row.
/// Uses UUID v7 so keys sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Create a new account ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a committed transaction record.
/// Assigned by the store in strictly increasing order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The identifier that follows this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TransactionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_creation() {
        let id1 = AccountId::new();
        let id2 = AccountId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_account_number_validation() {
        assert!(AccountNumber::new("5f0c8a4e-19d2-4b7e-a1f3-2c9d8e7b6a50").is_valid());
        assert!(AccountNumber::new("ACC-001").is_valid());
        assert!(!AccountNumber::new("").is_valid());
        assert!(!AccountNumber::new("has space").is_valid());
    }

    #[test]
    fn test_account_number_ordering() {
        let mut numbers = vec![
            AccountNumber::from("b"),
            AccountNumber::from("c"),
            AccountNumber::from("a"),
        ];
        numbers.sort();
        assert_eq!(numbers[0].as_str(), "a");
        assert_eq!(numbers[2].as_str(), "c");
    }

    #[test]
    fn test_transaction_id_next() {
        let id = TransactionId::new(41);
        assert_eq!(id.next(), TransactionId::new(42));
        assert!(id < id.next());
    }
}
