//! Transaction records: the append-only history of the ledger.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use corebank_common::{AccountNumber, LedgerError, Result, TransactionId};

/// Type of a transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Money paid into the owning account.
    Deposit,
    /// Money paid out of the owning account.
    Withdrawal,
    /// Money moved from the owning account to a counterparty account.
    Transfer,
    /// Interest credited to the owning account.
    Interest,
    /// Cancels the balance effect of an earlier deposit or withdrawal.
    Reversal,
}

impl TransactionType {
    pub const ALL: [TransactionType; 5] = [
        TransactionType::Deposit,
        TransactionType::Withdrawal,
        TransactionType::Transfer,
        TransactionType::Interest,
        TransactionType::Reversal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Transfer => "TRANSFER",
            TransactionType::Interest => "INTEREST",
            TransactionType::Reversal => "REVERSAL",
        }
    }

    /// Derived records have no downstream dependants and may be deleted.
    pub fn is_derived(&self) -> bool {
        matches!(self, TransactionType::Interest | TransactionType::Reversal)
    }

    /// Whether records of this type carry a payment method.
    pub fn requires_payment_method(&self) -> bool {
        matches!(
            self,
            TransactionType::Deposit | TransactionType::Withdrawal | TransactionType::Transfer
        )
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| LedgerError::invalid_operation(format!("invalid transaction type '{s}'")))
    }
}

/// How money entered or left the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Paypal,
    CreditCard,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Paypal => "PAYPAL",
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PAYPAL" => Ok(PaymentMethod::Paypal),
            "CREDIT_CARD" => Ok(PaymentMethod::CreditCard),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            other => Err(LedgerError::InvalidPaymentMethod(other.to_string())),
        }
    }
}

/// A committed transaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Store-assigned identifier.
    pub id: TransactionId,
    /// Account the record belongs to.
    pub account_number: AccountNumber,
    /// Record type.
    pub transaction_type: TransactionType,
    /// Strictly positive amount.
    pub amount: Decimal,
    /// When the record was committed (or last updated).
    pub timestamp: DateTime<Utc>,
    /// Human readable description.
    pub description: String,
    /// Reversed transaction, set only on reversals.
    pub related_transaction_id: Option<TransactionId>,
    /// Payment method for deposits, withdrawals and transfers.
    pub payment_method: Option<PaymentMethod>,
    /// Destination account of a transfer.
    pub counterparty: Option<AccountNumber>,
}

impl Transaction {
    /// Signed effect on the owning account's balance.
    ///
    /// Reversals are signed against the type of the record they reverse,
    /// which the caller supplies.
    pub fn owner_effect(&self, reversed_type: Option<TransactionType>) -> Decimal {
        match self.transaction_type {
            TransactionType::Deposit | TransactionType::Interest => self.amount,
            TransactionType::Withdrawal | TransactionType::Transfer => -self.amount,
            TransactionType::Reversal => match reversed_type {
                Some(TransactionType::Deposit) => -self.amount,
                Some(TransactionType::Withdrawal) => self.amount,
                _ => Decimal::ZERO,
            },
        }
    }
}

/// A transaction record not yet committed; the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDraft {
    pub account_number: AccountNumber,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub related_transaction_id: Option<TransactionId>,
    pub payment_method: Option<PaymentMethod>,
    pub counterparty: Option<AccountNumber>,
}

impl TransactionDraft {
    fn new(
        account_number: &AccountNumber,
        transaction_type: TransactionType,
        amount: Decimal,
        description: String,
    ) -> Self {
        Self {
            account_number: account_number.clone(),
            transaction_type,
            amount,
            timestamp: Utc::now(),
            description,
            related_transaction_id: None,
            payment_method: None,
            counterparty: None,
        }
    }

    /// Create a deposit draft.
    pub fn deposit(account: &AccountNumber, amount: Decimal, method: PaymentMethod) -> Self {
        Self {
            payment_method: Some(method),
            ..Self::new(
                account,
                TransactionType::Deposit,
                amount,
                format!("Deposit to account {account}"),
            )
        }
    }

    /// Create a withdrawal draft.
    pub fn withdrawal(account: &AccountNumber, amount: Decimal, method: PaymentMethod) -> Self {
        Self {
            payment_method: Some(method),
            ..Self::new(
                account,
                TransactionType::Withdrawal,
                amount,
                format!("Withdrawal from account {account}"),
            )
        }
    }

    /// Create a transfer draft, attributed to the source account.
    pub fn transfer(
        from: &AccountNumber,
        to: &AccountNumber,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Self {
        Self {
            payment_method: Some(method),
            counterparty: Some(to.clone()),
            ..Self::new(
                from,
                TransactionType::Transfer,
                amount,
                format!("Transfer from {from} to {to}"),
            )
        }
    }

    /// Create an interest draft.
    pub fn interest(account: &AccountNumber, amount: Decimal) -> Self {
        Self::new(
            account,
            TransactionType::Interest,
            amount,
            format!("Interest applied to account {account}"),
        )
    }

    /// Create a reversal of `target`.
    pub fn reversal(target: &Transaction) -> Self {
        let description = match target.transaction_type {
            TransactionType::Deposit => {
                format!("Reversal of deposit to account {}", target.account_number)
            }
            TransactionType::Withdrawal => {
                format!("Reversal of withdrawal from account {}", target.account_number)
            }
            other => format!("Reversal of {} {}", other, target.id),
        };
        Self {
            related_transaction_id: Some(target.id),
            ..Self::new(
                &target.account_number,
                TransactionType::Reversal,
                target.amount,
                description,
            )
        }
    }

    /// Turn the draft into a record with the given id.
    pub fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            account_number: self.account_number,
            transaction_type: self.transaction_type,
            amount: self.amount,
            timestamp: self.timestamp,
            description: self.description,
            related_transaction_id: self.related_transaction_id,
            payment_method: self.payment_method,
            counterparty: self.counterparty,
        }
    }
}
