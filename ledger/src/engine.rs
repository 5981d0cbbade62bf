//! Transaction engine.
//!
//! Every balance-changing operation follows the same cycle: lock the
//! accounts involved, re-read them from the store, validate, write one
//! [`Commit`] holding the new account rows and the transaction record,
//! release the locks, then queue a notification. Nothing is written when
//! validation fails, and a failed commit leaves the store untouched.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, instrument};

use corebank_common::{
    ensure_positive, now, percent_of, AccountNumber, LedgerError, Result, StoreError,
    TimeRange, Timestamp, TransactionId,
};

use crate::account::Account;
use crate::balance::Reconciliation;
use crate::locks::{AccountGuard, AccountLocks};
use crate::notifier::{Notification, NotificationDispatcher, NotificationKind};
use crate::registry::AccountRegistry;
use crate::store::{Commit, CommitReceipt, LedgerStore, TransactionFilter};
use crate::transaction::{PaymentMethod, Transaction, TransactionDraft, TransactionType};

/// New values for an existing deposit or withdrawal.
#[derive(Debug, Clone)]
pub struct TransactionUpdate {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    /// Must be DEPOSIT or WITHDRAWAL.
    pub transaction_type: TransactionType,
}

/// Untyped transaction request, as received from an outer API layer.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransaction {
    pub account_number: String,
    pub transaction_type: String,
    pub amount: Decimal,
    pub payment_method: String,
    /// Destination, required for transfers.
    #[serde(default)]
    pub to_account_number: Option<String>,
}

/// Applies deposits, withdrawals, transfers, interest, reversals and
/// updates atomically.
pub struct TransactionEngine {
    store: Arc<dyn LedgerStore>,
    registry: Arc<AccountRegistry>,
    locks: Arc<AccountLocks>,
    notifications: NotificationDispatcher,
}

impl TransactionEngine {
    /// Create a new engine.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        registry: Arc<AccountRegistry>,
        locks: Arc<AccountLocks>,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            registry,
            locks,
            notifications,
        }
    }

    /// Pay money into an account.
    #[instrument(skip(self))]
    pub async fn deposit(
        &self,
        account_number: &str,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<Transaction> {
        let amount = ensure_positive(amount)?;
        let number = AccountNumber::from(account_number);
        let guard = self.locks.acquire([&number]).await;

        let mut account = self.registry.fetch(&number).await?;
        account.ensure_active()?;
        account.credit(amount);

        let commit = Commit::new()
            .update_account(account)
            .append(TransactionDraft::deposit(&number, amount, method));
        let (owner, transaction) = self.apply(commit, &number).await?;
        drop(guard);

        info!(
            account = %number,
            amount = %amount,
            balance = %owner.balance,
            transaction_id = %transaction.id,
            "Deposit recorded"
        );
        self.notify(NotificationKind::Committed, &transaction, &owner);
        Ok(transaction)
    }

    /// Take money out of an account.
    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        account_number: &str,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<Transaction> {
        let amount = ensure_positive(amount)?;
        let number = AccountNumber::from(account_number);
        let guard = self.locks.acquire([&number]).await;

        let mut account = self.registry.fetch(&number).await?;
        account.ensure_active()?;
        account.debit(amount)?;

        let commit = Commit::new()
            .update_account(account)
            .append(TransactionDraft::withdrawal(&number, amount, method));
        let (owner, transaction) = self.apply(commit, &number).await?;
        drop(guard);

        info!(
            account = %number,
            amount = %amount,
            balance = %owner.balance,
            transaction_id = %transaction.id,
            "Withdrawal recorded"
        );
        self.notify(NotificationKind::Committed, &transaction, &owner);
        Ok(transaction)
    }

    /// Move money between two accounts.
    ///
    /// One TRANSFER record is written, owned by the source account.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        from_account: &str,
        to_account: &str,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<Transaction> {
        let amount = ensure_positive(amount)?;
        let from = AccountNumber::from(from_account);
        let to = AccountNumber::from(to_account);
        if from == to {
            return Err(LedgerError::invalid_operation(
                "source and destination accounts must differ",
            ));
        }
        let guard = self.locks.acquire([&from, &to]).await;

        let mut source = self.registry.fetch(&from).await?;
        let mut destination = self.registry.fetch(&to).await?;
        source.ensure_active()?;
        destination.ensure_active()?;
        source.debit(amount)?;
        destination.credit(amount);

        let commit = Commit::new()
            .update_account(source)
            .update_account(destination)
            .append(TransactionDraft::transfer(&from, &to, amount, method));
        let (owner, transaction) = self.apply(commit, &from).await?;
        drop(guard);

        info!(
            from = %from,
            to = %to,
            amount = %amount,
            transaction_id = %transaction.id,
            "Transfer recorded"
        );
        self.notify(NotificationKind::Committed, &transaction, &owner);
        Ok(transaction)
    }

    /// Credit interest at the account's rate, rounded half-up to cents.
    #[instrument(skip(self))]
    pub async fn apply_interest(&self, account_number: &str) -> Result<Transaction> {
        let number = AccountNumber::from(account_number);
        let guard = self.locks.acquire([&number]).await;

        let mut account = self.registry.fetch(&number).await?;
        account.ensure_active()?;
        if account.interest_rate <= Decimal::ZERO {
            return Err(LedgerError::InvalidRate {
                account: number,
                rate: account.interest_rate,
            });
        }

        let interest = percent_of(account.balance, account.interest_rate);
        if interest <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "interest on balance {} at {}% rounds to zero",
                account.balance, account.interest_rate
            )));
        }
        account.credit(interest);

        let commit = Commit::new()
            .update_account(account)
            .append(TransactionDraft::interest(&number, interest));
        let (owner, transaction) = self.apply(commit, &number).await?;
        drop(guard);

        info!(
            account = %number,
            interest = %interest,
            balance = %owner.balance,
            "Interest applied"
        );
        self.notify(NotificationKind::Committed, &transaction, &owner);
        Ok(transaction)
    }

    /// Cancel the balance effect of a deposit or withdrawal.
    ///
    /// A transaction can be reversed at most once, even if the reversal
    /// record is later deleted.
    #[instrument(skip(self))]
    pub async fn reverse_transaction(&self, transaction_id: TransactionId) -> Result<Transaction> {
        let (guard, target) = self.lock_owner(transaction_id).await?;

        match target.transaction_type {
            TransactionType::Reversal => {
                return Err(LedgerError::invalid_operation(
                    "a reversal cannot be reversed",
                ));
            }
            TransactionType::Transfer | TransactionType::Interest => {
                return Err(LedgerError::invalid_operation(format!(
                    "{} transactions cannot be reversed",
                    target.transaction_type
                )));
            }
            TransactionType::Deposit | TransactionType::Withdrawal => {}
        }
        if self.store.is_reversed(target.id).await? {
            return Err(LedgerError::invalid_operation(format!(
                "transaction {} is already reversed",
                target.id
            )));
        }

        let number = target.account_number.clone();
        let mut account = self.registry.fetch(&number).await?;
        account.ensure_active()?;
        if target.transaction_type == TransactionType::Deposit {
            account.debit(target.amount)?;
        } else {
            account.credit(target.amount);
        }

        let commit = Commit::new()
            .update_account(account)
            .append(TransactionDraft::reversal(&target));
        let (owner, transaction) = self.apply(commit, &number).await?;
        drop(guard);

        info!(
            account = %number,
            reversed = %target.id,
            transaction_id = %transaction.id,
            "Transaction reversed"
        );
        self.notify(NotificationKind::Committed, &transaction, &owner);
        Ok(transaction)
    }

    /// Rewrite an unreversed deposit or withdrawal in place.
    ///
    /// The original effect is undone and the new one applied in the same commit.
    #[instrument(skip(self, update))]
    pub async fn update_transaction(
        &self,
        transaction_id: TransactionId,
        update: TransactionUpdate,
    ) -> Result<Transaction> {
        let (guard, original) = self.lock_owner(transaction_id).await?;

        if !matches!(
            original.transaction_type,
            TransactionType::Deposit | TransactionType::Withdrawal
        ) {
            return Err(LedgerError::invalid_operation(format!(
                "{} transactions cannot be updated",
                original.transaction_type
            )));
        }
        if self.store.is_reversed(original.id).await? {
            return Err(LedgerError::invalid_operation(format!(
                "transaction {} has been reversed",
                original.id
            )));
        }
        if !matches!(
            update.transaction_type,
            TransactionType::Deposit | TransactionType::Withdrawal
        ) {
            return Err(LedgerError::invalid_operation(format!(
                "cannot update a transaction to {}",
                update.transaction_type
            )));
        }
        let amount = ensure_positive(update.amount)?;

        let number = original.account_number.clone();
        let mut account = self.registry.fetch(&number).await?;
        account.ensure_active()?;

        match original.transaction_type {
            TransactionType::Deposit => account.debit(original.amount)?,
            _ => account.credit(original.amount),
        }
        let description = match update.transaction_type {
            TransactionType::Deposit => {
                account.credit(amount);
                format!("Updated deposit to account {number}")
            }
            _ => {
                account.debit(amount)?;
                format!("Updated withdrawal from account {number}")
            }
        };

        let updated = Transaction {
            transaction_type: update.transaction_type,
            amount,
            payment_method: Some(update.payment_method),
            timestamp: now(),
            description,
            ..original
        };
        let commit = Commit::new().update_account(account).replace(updated);
        let (owner, transaction) = self.apply(commit, &number).await?;
        drop(guard);

        info!(
            account = %number,
            transaction_id = %transaction.id,
            transaction_type = %transaction.transaction_type,
            amount = %amount,
            "Transaction updated"
        );
        self.notify(NotificationKind::Updated, &transaction, &owner);
        Ok(transaction)
    }

    /// Delete an INTEREST or REVERSAL record. Balances are not touched.
    #[instrument(skip(self))]
    pub async fn delete_transaction(&self, transaction_id: TransactionId) -> Result<()> {
        let (guard, target) = self.lock_owner(transaction_id).await?;

        if !target.transaction_type.is_derived() {
            return Err(LedgerError::invalid_operation(format!(
                "only INTEREST or REVERSAL transactions can be deleted, {} is {}",
                target.id, target.transaction_type
            )));
        }

        // The owner may already be gone, in which case nobody is notified.
        let owner = self.store.account(&target.account_number).await?;
        self.store.commit(Commit::new().remove(target.id)).await?;
        drop(guard);

        info!(
            account = %target.account_number,
            transaction_id = %target.id,
            "Transaction deleted"
        );
        if let Some(owner) = owner {
            self.notify(NotificationKind::Removed, &target, &owner);
        }
        Ok(())
    }

    /// Validate an untyped request and run the matching operation.
    #[instrument(skip(self, request), fields(account = %request.account_number))]
    pub async fn create_transaction(&self, request: CreateTransaction) -> Result<Transaction> {
        let amount = ensure_positive(request.amount)?;
        let method: PaymentMethod = request.payment_method.parse()?;
        let transaction_type: TransactionType = request.transaction_type.parse()?;

        match transaction_type {
            TransactionType::Deposit => {
                self.deposit(&request.account_number, amount, method).await
            }
            TransactionType::Withdrawal => {
                self.withdraw(&request.account_number, amount, method).await
            }
            TransactionType::Transfer => {
                let to = request
                    .to_account_number
                    .as_deref()
                    .filter(|to| !to.trim().is_empty())
                    .ok_or_else(|| {
                        LedgerError::invalid_operation(
                            "destination account number required for transfer",
                        )
                    })?;
                self.transfer(&request.account_number, to, amount, method).await
            }
            other => Err(LedgerError::invalid_operation(format!(
                "{other} transactions cannot be created directly"
            ))),
        }
    }

    /// Look up a transaction by id.
    pub async fn get_transaction(&self, transaction_id: TransactionId) -> Result<Transaction> {
        self.store
            .transaction(transaction_id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(transaction_id))
    }

    /// Records owned by an account, oldest first.
    pub async fn transactions_for_account(&self, account_number: &str) -> Result<Vec<Transaction>> {
        let number = AccountNumber::from(account_number);
        self.registry.fetch(&number).await?;
        Ok(self
            .store
            .transactions(&TransactionFilter::Account(number))
            .await?)
    }

    /// Records of one type, oldest first.
    pub async fn transactions_by_type(
        &self,
        transaction_type: TransactionType,
    ) -> Result<Vec<Transaction>> {
        Ok(self
            .store
            .transactions(&TransactionFilter::Type(transaction_type))
            .await?)
    }

    /// Records timestamped within `[start, end]`.
    pub async fn transactions_between(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Transaction>> {
        let range = TimeRange::new(start, end)?;
        Ok(self
            .store
            .transactions(&TransactionFilter::Between(range))
            .await?)
    }

    /// Every record in the ledger, oldest first.
    pub async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.store.transactions(&TransactionFilter::All).await?)
    }

    /// Replay the transaction log of an account against its balance.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, account_number: &str) -> Result<Reconciliation> {
        let number = AccountNumber::from(account_number);
        let _guard = self.locks.acquire([&number]).await;

        let account = self.registry.fetch(&number).await?;
        let owned = self
            .store
            .transactions(&TransactionFilter::Account(number.clone()))
            .await?;
        let received = self
            .store
            .transactions(&TransactionFilter::Counterparty(number.clone()))
            .await?;

        let mut reversed_types = HashMap::new();
        for reversal in owned
            .iter()
            .filter(|t| t.transaction_type == TransactionType::Reversal)
        {
            if let Some(target_id) = reversal.related_transaction_id {
                if let Some(target) = self.store.transaction(target_id).await? {
                    reversed_types.insert(target_id, target.transaction_type);
                }
            }
        }

        let reconciliation = Reconciliation::compute(&account, &owned, &received, &reversed_types);
        info!(
            account = %number,
            expected = %reconciliation.expected,
            actual = %reconciliation.actual,
            balanced = reconciliation.is_balanced(),
            "Account reconciled"
        );
        Ok(reconciliation)
    }

    /// Lock the owner of a transaction and return the record as read under the lock.
    async fn lock_owner(&self, transaction_id: TransactionId) -> Result<(AccountGuard, Transaction)> {
        let owner = self.get_transaction(transaction_id).await?.account_number;
        let guard = self.locks.acquire([&owner]).await;
        // owners never change, but the record itself may have been updated or deleted
        let transaction = self.get_transaction(transaction_id).await?;
        Ok((guard, transaction))
    }

    async fn apply(
        &self,
        commit: Commit,
        owner: &AccountNumber,
    ) -> Result<(Account, Transaction)> {
        let CommitReceipt {
            accounts,
            transaction,
        } = self.store.commit(commit).await?;
        let account = accounts
            .into_iter()
            .find(|a| &a.account_number == owner)
            .ok_or_else(|| StoreError::MissingRecord(format!("account {owner}")))?;
        let transaction = transaction
            .ok_or_else(|| StoreError::MissingRecord("committed transaction".to_string()))?;
        Ok((account, transaction))
    }

    fn notify(&self, kind: NotificationKind, transaction: &Transaction, owner: &Account) {
        self.notifications.enqueue(Notification {
            kind,
            transaction: transaction.clone(),
            holder_name: owner.holder_name.clone(),
            contact: owner.email.clone(),
        });
    }
}
