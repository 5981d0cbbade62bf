//! Account registry: creation, profile updates and the open/closed lifecycle.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use corebank_common::{now, AccountNumber, LedgerError, Result, StoreError};

use crate::account::{Account, AccountStatus};
use crate::locks::AccountLocks;
use crate::store::{Commit, LedgerStore};

/// Source of fresh account numbers.
pub trait AccountNumberGenerator: Send + Sync {
    /// Produce a number that has, with overwhelming probability, never been issued.
    fn next_account_number(&self) -> AccountNumber;
}

/// Random 128-bit account numbers (UUID v4).
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidAccountNumbers;

impl AccountNumberGenerator for UuidAccountNumbers {
    fn next_account_number(&self) -> AccountNumber {
        AccountNumber::new(Uuid::new_v4().to_string())
    }
}

/// Fields accepted when opening an account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub holder_name: String,
    pub account_type: String,
    pub email: Option<String>,
}

impl NewAccount {
    pub fn new(holder_name: impl Into<String>, account_type: impl Into<String>) -> Self {
        Self {
            holder_name: holder_name.into(),
            account_type: account_type.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Profile fields that can be changed on an existing account.
#[derive(Debug, Clone)]
pub struct AccountUpdate {
    pub holder_name: String,
    pub email: Option<String>,
    /// `None` resets the rate to zero.
    pub interest_rate: Option<Decimal>,
}

/// CRUD and lifecycle management for accounts.
pub struct AccountRegistry {
    store: Arc<dyn LedgerStore>,
    locks: Arc<AccountLocks>,
    generator: Arc<dyn AccountNumberGenerator>,
    number_attempts: usize,
}

impl AccountRegistry {
    /// Create a new registry.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<AccountLocks>,
        generator: Arc<dyn AccountNumberGenerator>,
        number_attempts: usize,
    ) -> Self {
        Self {
            store,
            locks,
            generator,
            number_attempts: number_attempts.max(1),
        }
    }

    /// Open a new active account with a zero balance.
    #[instrument(skip(self, request), fields(holder = %request.holder_name))]
    pub async fn create(&self, request: NewAccount) -> Result<Account> {
        if request.holder_name.trim().is_empty() {
            return Err(LedgerError::invalid_operation("holder name is required"));
        }
        if request.account_type.trim().is_empty() {
            return Err(LedgerError::invalid_operation("account type is required"));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let number = self.generator.next_account_number();
            if !number.is_valid() {
                if attempt < self.number_attempts {
                    warn!(account = %number, attempt, "Generated account number is malformed, drawing another");
                    continue;
                }
                return Err(LedgerError::invalid_operation(format!(
                    "generated account number '{number}' is malformed"
                )));
            }
            let account = Account::new(
                number.clone(),
                request.holder_name.clone(),
                request.account_type.clone(),
                request.email.clone(),
            );

            match self.store.commit(Commit::new().insert_account(account)).await {
                Ok(receipt) => {
                    let account = receipt
                        .account(&number)
                        .cloned()
                        .ok_or_else(|| StoreError::MissingRecord(format!("account {number}")))?;
                    info!(account = %number, "Account created");
                    return Ok(account);
                }
                Err(StoreError::DuplicateAccount(taken)) if attempt < self.number_attempts => {
                    warn!(account = %taken, attempt, "Account number already issued, drawing another");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Change holder name, contact address and interest rate.
    #[instrument(skip(self, update))]
    pub async fn update(&self, account_number: &str, update: AccountUpdate) -> Result<Account> {
        let number = AccountNumber::from(account_number);
        let rate = update.interest_rate.unwrap_or(Decimal::ZERO);
        if rate < Decimal::ZERO {
            return Err(LedgerError::InvalidRate {
                account: number,
                rate,
            });
        }

        let _guard = self.locks.acquire([&number]).await;
        let mut account = self.fetch(&number).await?;
        account.holder_name = update.holder_name;
        account.email = update.email;
        account.interest_rate = rate;
        account.updated_at = now();

        let receipt = self.store.commit(Commit::new().update_account(account)).await?;
        info!(account = %number, "Account updated");
        committed(&receipt.accounts, &number)
    }

    /// Close an active account whose balance is zero.
    #[instrument(skip(self))]
    pub async fn close(&self, account_number: &str) -> Result<Account> {
        let number = AccountNumber::from(account_number);
        let _guard = self.locks.acquire([&number]).await;

        let mut account = self.fetch(&number).await?;
        account.close()?;

        let receipt = self.store.commit(Commit::new().update_account(account)).await?;
        info!(account = %number, "Account closed");
        committed(&receipt.accounts, &number)
    }

    /// Permanently delete a closed account that owns no transactions.
    ///
    /// The number is retired by the store and never issued again.
    #[instrument(skip(self))]
    pub async fn delete(&self, account_number: &str) -> Result<()> {
        let number = AccountNumber::from(account_number);
        let _guard = self.locks.acquire([&number]).await;

        let account = self.fetch(&number).await?;
        if account.status != AccountStatus::Closed {
            return Err(LedgerError::invalid_state(
                &number,
                "account must be closed before deletion",
            ));
        }
        let owned = self.store.count_transactions(&number).await?;
        if owned > 0 {
            return Err(LedgerError::invalid_state(
                &number,
                format!("account still owns {owned} transactions"),
            ));
        }

        self.store.commit(Commit::new().delete_account(&account)).await?;
        info!(account = %number, "Account deleted");
        Ok(())
    }

    /// Look up an account by number.
    pub async fn get(&self, account_number: &str) -> Result<Account> {
        self.fetch(&AccountNumber::from(account_number)).await
    }

    /// List accounts with the given status.
    pub async fn list_by_status(&self, status: AccountStatus) -> Result<Vec<Account>> {
        Ok(self.store.accounts(Some(status)).await?)
    }

    /// List every account.
    pub async fn list_all(&self) -> Result<Vec<Account>> {
        Ok(self.store.accounts(None).await?)
    }

    pub(crate) async fn fetch(&self, number: &AccountNumber) -> Result<Account> {
        self.store
            .account(number)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(number.clone()))
    }
}

fn committed(accounts: &[Account], number: &AccountNumber) -> Result<Account> {
    accounts
        .iter()
        .find(|a| &a.account_number == number)
        .cloned()
        .ok_or_else(|| StoreError::MissingRecord(format!("account {number}")).into())
}
