//! Balance reconciliation against the transaction log.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use corebank_common::{AccountNumber, TransactionId};

use crate::account::Account;
use crate::transaction::{Transaction, TransactionType};

/// Result of replaying an account's records against its stored balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub account_number: AccountNumber,
    /// Balance implied by the transaction log.
    pub expected: Decimal,
    /// Balance stored on the account row.
    pub actual: Decimal,
    /// Records that contributed to `expected`.
    pub records: usize,
}

impl Reconciliation {
    /// Replay the log for `account`.
    ///
    /// `owned` are the records the account owns, `received` the transfers
    /// naming it as counterparty. `reversed_types` maps every reversal
    /// target to its type.
    pub fn compute(
        account: &Account,
        owned: &[Transaction],
        received: &[Transaction],
        reversed_types: &HashMap<TransactionId, TransactionType>,
    ) -> Self {
        let outgoing: Decimal = owned
            .iter()
            .map(|t| {
                let target = t
                    .related_transaction_id
                    .and_then(|id| reversed_types.get(&id).copied());
                t.owner_effect(target)
            })
            .sum();
        let incoming: Decimal = received
            .iter()
            .filter(|t| t.transaction_type == TransactionType::Transfer)
            .map(|t| t.amount)
            .sum();

        Self {
            account_number: account.account_number.clone(),
            expected: outgoing + incoming,
            actual: account.balance,
            records: owned.len() + received.len(),
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.expected == self.actual
    }

    /// `actual - expected`.
    pub fn discrepancy(&self) -> Decimal {
        self.actual - self.expected
    }
}
