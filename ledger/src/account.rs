//! Account definitions for the ledger.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use corebank_common::{AccountId, AccountNumber, LedgerError, Result};

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    /// Account is active and can transact.
    Active,
    /// Account is closed. Terminal.
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(AccountStatus::Active),
            "CLOSED" => Ok(AccountStatus::Closed),
            other => Err(LedgerError::invalid_operation(format!(
                "unknown account status '{other}'"
            ))),
        }
    }
}

/// A ledger account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Internal surrogate key.
    pub id: AccountId,
    /// Public account number, unique for the lifetime of the ledger.
    pub account_number: AccountNumber,
    /// Name of the account holder.
    pub holder_name: String,
    /// Free-form product type ("SAVINGS", "CHECKING", ...).
    pub account_type: String,
    /// Current balance. Never negative.
    pub balance: Decimal,
    /// Lifecycle status.
    pub status: AccountStatus,
    /// Yearly interest rate in percent.
    pub interest_rate: Decimal,
    /// Contact address for notifications.
    pub email: Option<String>,
    /// Optimistic concurrency counter, bumped by the store on every write.
    pub version: u64,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account with a zero balance.
    pub fn new(
        account_number: AccountNumber,
        holder_name: impl Into<String>,
        account_type: impl Into<String>,
        email: Option<String>,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: AccountId::new(),
            account_number,
            holder_name: holder_name.into(),
            account_type: account_type.into(),
            balance: Decimal::ZERO,
            status: AccountStatus::Active,
            interest_rate: Decimal::ZERO,
            email,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if account can transact.
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Fail with `InvalidState` unless the account is active.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(LedgerError::invalid_state(
                &self.account_number,
                "account is not active",
            ))
        }
    }

    /// Check if account has sufficient funds for a debit.
    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Increase the balance.
    pub fn credit(&mut self, amount: Decimal) {
        self.balance += amount;
        self.updated_at = Utc::now();
    }

    /// Decrease the balance, refusing to go below zero.
    pub fn debit(&mut self, amount: Decimal) -> Result<()> {
        if !self.has_sufficient_funds(amount) {
            return Err(LedgerError::InsufficientFunds {
                account: self.account_number.clone(),
                required: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Close the account. Only an active account with a zero balance can close.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(LedgerError::invalid_state(
                &self.account_number,
                "account is already closed",
            ));
        }
        if !self.balance.is_zero() {
            return Err(LedgerError::invalid_state(
                &self.account_number,
                format!("balance must be zero to close, is {}", self.balance),
            ));
        }
        self.status = AccountStatus::Closed;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corebank_common::ErrorKind;
    use rust_decimal_macros::dec;

    fn test_account() -> Account {
        Account::new(AccountNumber::from("ACC-1"), "Ada Lovelace", "SAVINGS", None)
    }

    #[test]
    fn test_new_account() {
        let account = test_account();
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.interest_rate, Decimal::ZERO);
        assert_eq!(account.version, 0);
    }

    #[test]
    fn test_credit_and_debit() {
        let mut account = test_account();
        account.credit(dec!(50.00));
        account.debit(dec!(20.00)).unwrap();
        assert_eq!(account.balance, dec!(30.00));

        let err = account.debit(dec!(30.01)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(account.balance, dec!(30.00));

        account.debit(dec!(30.00)).unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
    }

    #[test]
    fn test_close() {
        let mut account = test_account();
        account.credit(dec!(1));
        assert_eq!(account.close().unwrap_err().kind(), ErrorKind::InvalidState);

        account.debit(dec!(1)).unwrap();
        account.close().unwrap();
        assert_eq!(account.status, AccountStatus::Closed);
        assert_eq!(account.ensure_active().unwrap_err().kind(), ErrorKind::InvalidState);

        // never reopened, never closed twice
        assert_eq!(account.close().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_status_round_trip() {
        assert_eq!("ACTIVE".parse::<AccountStatus>().unwrap(), AccountStatus::Active);
        assert_eq!(AccountStatus::Closed.to_string(), "CLOSED");
        assert!("OPEN".parse::<AccountStatus>().is_err());
    }
}
