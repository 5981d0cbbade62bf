//! Error types for ledger operations.

use crate::{AccountNumber, Timestamp, TransactionId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for ledger operations.
///
/// Validation variants are always raised before anything is written; only
/// [`LedgerError::Store`] can occur once a commit has been attempted, and in
/// that case the commit was not applied.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// No account carries this number.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountNumber),

    /// No transaction carries this identifier.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// Account is not in the lifecycle state the operation needs.
    #[error("Account {account} is in the wrong state: {reason}")]
    InvalidState {
        account: AccountNumber,
        reason: String,
    },

    /// Non-positive or malformed amount.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Payment method outside the accepted set.
    #[error("Invalid payment method: {0}")]
    InvalidPaymentMethod(String),

    /// Balance would go negative.
    #[error("Insufficient funds in {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: AccountNumber,
        required: Decimal,
        available: Decimal,
    },

    /// Interest rate unusable for accrual.
    #[error("Invalid interest rate {rate} on account {account}")]
    InvalidRate { account: AccountNumber, rate: Decimal },

    /// Operation not allowed for this record's type or history.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Query range where start is after end.
    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange { start: Timestamp, end: Timestamp },

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures reported by a ledger store.
///
/// A store returning any of these guarantees the commit left no trace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Row was modified since it was read.
    #[error("Version conflict on account {account}: expected {expected}, found {found}")]
    Conflict {
        account: AccountNumber,
        expected: u64,
        found: u64,
    },

    /// Account number is already in use or was used by a deleted account.
    #[error("Account number already issued: {0}")]
    DuplicateAccount(AccountNumber),

    /// Transaction already has a reversal recorded against it.
    #[error("Transaction {0} is already reversed")]
    DuplicateReversal(TransactionId),

    /// A record the commit refers to does not exist.
    #[error("Record missing at commit: {0}")]
    MissingRecord(String),

    /// Record is malformed for its type.
    #[error("Record rejected: {0}")]
    InvalidRecord(String),

    /// Backend could not be reached or refused the write.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Coarse error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    InvalidAmount,
    InvalidPaymentMethod,
    InsufficientFunds,
    InvalidRate,
    InvalidOperation,
    InvalidRange,
    StoreError,
}

impl LedgerError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AccountNotFound(_) | LedgerError::TransactionNotFound(_) => {
                ErrorKind::NotFound
            }
            LedgerError::InvalidState { .. } => ErrorKind::InvalidState,
            LedgerError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            LedgerError::InvalidPaymentMethod(_) => ErrorKind::InvalidPaymentMethod,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::InvalidRate { .. } => ErrorKind::InvalidRate,
            LedgerError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            LedgerError::InvalidRange { .. } => ErrorKind::InvalidRange,
            LedgerError::Store(_) => ErrorKind::StoreError,
        }
    }

    /// Get a stable error code for callers that map errors onto responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            LedgerError::InvalidState { .. } => "INVALID_STATE",
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InvalidPaymentMethod(_) => "INVALID_PAYMENT_METHOD",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::InvalidRate { .. } => "INVALID_RATE",
            LedgerError::InvalidOperation(_) => "INVALID_OPERATION",
            LedgerError::InvalidRange { .. } => "INVALID_RANGE",
            LedgerError::Store(StoreError::Conflict { .. }) => "STORE_CONFLICT",
            LedgerError::Store(_) => "STORE_ERROR",
        }
    }

    /// Build an [`LedgerError::InvalidState`].
    pub fn invalid_state(account: &AccountNumber, reason: impl Into<String>) -> Self {
        LedgerError::InvalidState {
            account: account.clone(),
            reason: reason.into(),
        }
    }

    /// Build an [`LedgerError::InvalidOperation`].
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        LedgerError::InvalidOperation(reason.into())
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_kinds() {
        let err = LedgerError::AccountNotFound(AccountNumber::from("ACC-1"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.error_code(), "ACCOUNT_NOT_FOUND");

        let err = LedgerError::TransactionNotFound(TransactionId::new(7));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = LedgerError::InsufficientFunds {
            account: AccountNumber::from("ACC-1"),
            required: dec!(75.00),
            available: dec!(50.00),
        };
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(
            err.to_string(),
            "Insufficient funds in ACC-1: required 75.00, available 50.00"
        );
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: LedgerError = StoreError::Unavailable("disk full".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::StoreError);
        assert_eq!(err.error_code(), "STORE_ERROR");
        assert_eq!(err.to_string(), "Store unavailable: disk full");

        let err: LedgerError = StoreError::Conflict {
            account: AccountNumber::from("ACC-1"),
            expected: 3,
            found: 4,
        }
        .into();
        assert_eq!(err.error_code(), "STORE_CONFLICT");
    }
}
