//! Ledger store seam and the in-memory adapter.
//!
//! The store owns persisted rows. Everything a ledger operation writes goes
//! through a single [`Commit`], which a store applies entirely or not at all.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use corebank_common::{AccountNumber, StoreError, StoreResult, TimeRange, TransactionId};

use crate::account::{Account, AccountStatus};
use crate::transaction::{PaymentMethod, Transaction, TransactionDraft, TransactionType};

/// A write to one account row.
#[derive(Debug, Clone)]
pub enum AccountWrite {
    /// New row. The account number must never have been issued before.
    Insert(Account),
    /// Replace a row. `version` must match the stored row.
    Update(Account),
    /// Remove a row and retire its number. `version` must match the stored row.
    Delete {
        account_number: AccountNumber,
        version: u64,
    },
}

/// A write to the transaction log.
#[derive(Debug, Clone)]
pub enum TransactionWrite {
    /// Append a new record; the store assigns the next identifier.
    Append(TransactionDraft),
    /// Replace an existing record in place.
    Replace(Transaction),
    /// Delete an existing record.
    Remove(TransactionId),
}

/// A set of writes that must be applied together.
#[derive(Debug, Clone, Default)]
pub struct Commit {
    pub accounts: Vec<AccountWrite>,
    pub transaction: Option<TransactionWrite>,
}

impl Commit {
    /// Create an empty commit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new account row.
    pub fn insert_account(mut self, account: Account) -> Self {
        self.accounts.push(AccountWrite::Insert(account));
        self
    }

    /// Overwrite an account row, checked against the version it was read at.
    pub fn update_account(mut self, account: Account) -> Self {
        self.accounts.push(AccountWrite::Update(account));
        self
    }

    /// Remove an account row at the version it was read at.
    pub fn delete_account(mut self, account: &Account) -> Self {
        self.accounts.push(AccountWrite::Delete {
            account_number: account.account_number.clone(),
            version: account.version,
        });
        self
    }

    /// Append a record. Replaces any transaction write already set.
    pub fn append(mut self, draft: TransactionDraft) -> Self {
        self.transaction = Some(TransactionWrite::Append(draft));
        self
    }

    /// Rewrite an existing record under its current id.
    pub fn replace(mut self, transaction: Transaction) -> Self {
        self.transaction = Some(TransactionWrite::Replace(transaction));
        self
    }

    /// Delete a record by id.
    pub fn remove(mut self, id: TransactionId) -> Self {
        self.transaction = Some(TransactionWrite::Remove(id));
        self
    }
}

/// Rows as they stand after a successful commit.
#[derive(Debug, Clone, Default)]
pub struct CommitReceipt {
    /// Inserted or updated accounts, in commit order. Deleted accounts are omitted.
    pub accounts: Vec<Account>,
    /// Appended, replaced or removed transaction record.
    pub transaction: Option<Transaction>,
}

impl CommitReceipt {
    /// Account row for `number` as committed.
    pub fn account(&self, number: &AccountNumber) -> Option<&Account> {
        self.accounts.iter().find(|a| &a.account_number == number)
    }
}

/// Filter for transaction queries. Results are always ordered by id.
#[derive(Debug, Clone)]
pub enum TransactionFilter {
    All,
    /// Records owned by an account.
    Account(AccountNumber),
    /// Transfers whose destination is an account.
    Counterparty(AccountNumber),
    Type(TransactionType),
    Between(TimeRange),
}

impl TransactionFilter {
    fn matches(&self, transaction: &Transaction) -> bool {
        match self {
            TransactionFilter::All => true,
            TransactionFilter::Account(number) => &transaction.account_number == number,
            TransactionFilter::Counterparty(number) => {
                transaction.counterparty.as_ref() == Some(number)
            }
            TransactionFilter::Type(t) => &transaction.transaction_type == t,
            TransactionFilter::Between(range) => range.contains(transaction.timestamp),
        }
    }
}

/// Durable storage for accounts and transactions.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Look up an account by number.
    async fn account(&self, number: &AccountNumber) -> StoreResult<Option<Account>>;

    /// List accounts, optionally restricted to one status.
    async fn accounts(&self, status: Option<AccountStatus>) -> StoreResult<Vec<Account>>;

    /// Look up a transaction by id.
    async fn transaction(&self, id: TransactionId) -> StoreResult<Option<Transaction>>;

    /// Query transactions.
    async fn transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>>;

    /// Number of transaction records owned by an account.
    async fn count_transactions(&self, owner: &AccountNumber) -> StoreResult<usize>;

    /// Whether a reversal has ever been committed against `id`.
    ///
    /// Stays true after the reversal record itself is deleted.
    async fn is_reversed(&self, id: TransactionId) -> StoreResult<bool>;

    /// Apply a commit atomically.
    async fn commit(&self, commit: Commit) -> StoreResult<CommitReceipt>;
}

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountNumber, Account>,
    retired_numbers: HashSet<AccountNumber>,
    transactions: BTreeMap<TransactionId, Transaction>,
    reversed: HashSet<TransactionId>,
    last_transaction_id: TransactionId,
}

impl Tables {
    fn check_version(&self, number: &AccountNumber, expected: u64) -> StoreResult<()> {
        let stored = self
            .accounts
            .get(number)
            .ok_or_else(|| StoreError::MissingRecord(format!("account {number}")))?;
        if stored.version != expected {
            return Err(StoreError::Conflict {
                account: number.clone(),
                expected,
                found: stored.version,
            });
        }
        Ok(())
    }

    /// Check every write against the current tables without touching them.
    fn validate(&self, commit: &Commit) -> StoreResult<()> {
        let mut touched = HashSet::new();
        for write in &commit.accounts {
            let number = match write {
                AccountWrite::Insert(account) => {
                    let number = &account.account_number;
                    if self.accounts.contains_key(number) || self.retired_numbers.contains(number)
                    {
                        return Err(StoreError::DuplicateAccount(number.clone()));
                    }
                    number
                }
                AccountWrite::Update(account) => {
                    self.check_version(&account.account_number, account.version)?;
                    &account.account_number
                }
                AccountWrite::Delete {
                    account_number,
                    version,
                } => {
                    self.check_version(account_number, *version)?;
                    account_number
                }
            };
            if !touched.insert(number.clone()) {
                return Err(StoreError::Unavailable(format!(
                    "account {number} written twice in one commit"
                )));
            }
        }

        match &commit.transaction {
            Some(TransactionWrite::Append(draft)) => {
                check_payment_method(draft.transaction_type, draft.payment_method)?;
                if let Some(target) = draft.related_transaction_id {
                    if draft.transaction_type == TransactionType::Reversal
                        && self.reversed.contains(&target)
                    {
                        return Err(StoreError::DuplicateReversal(target));
                    }
                }
            }
            Some(TransactionWrite::Replace(transaction)) => {
                check_payment_method(transaction.transaction_type, transaction.payment_method)?;
                if !self.transactions.contains_key(&transaction.id) {
                    return Err(StoreError::MissingRecord(format!(
                        "transaction {}",
                        transaction.id
                    )));
                }
            }
            Some(TransactionWrite::Remove(id)) => {
                if !self.transactions.contains_key(id) {
                    return Err(StoreError::MissingRecord(format!("transaction {id}")));
                }
            }
            None => {}
        }

        Ok(())
    }

    fn apply(&mut self, commit: Commit) -> CommitReceipt {
        let mut receipt = CommitReceipt::default();

        for write in commit.accounts {
            match write {
                AccountWrite::Insert(mut account) => {
                    account.version = 1;
                    self.accounts
                        .insert(account.account_number.clone(), account.clone());
                    receipt.accounts.push(account);
                }
                AccountWrite::Update(mut account) => {
                    account.version += 1;
                    self.accounts
                        .insert(account.account_number.clone(), account.clone());
                    receipt.accounts.push(account);
                }
                AccountWrite::Delete { account_number, .. } => {
                    self.accounts.remove(&account_number);
                    self.retired_numbers.insert(account_number);
                }
            }
        }

        receipt.transaction = match commit.transaction {
            Some(TransactionWrite::Append(draft)) => {
                self.last_transaction_id = self.last_transaction_id.next();
                let transaction = draft.into_transaction(self.last_transaction_id);
                if transaction.transaction_type == TransactionType::Reversal {
                    if let Some(target) = transaction.related_transaction_id {
                        self.reversed.insert(target);
                    }
                }
                self.transactions.insert(transaction.id, transaction.clone());
                Some(transaction)
            }
            Some(TransactionWrite::Replace(transaction)) => {
                self.transactions.insert(transaction.id, transaction.clone());
                Some(transaction)
            }
            Some(TransactionWrite::Remove(id)) => self.transactions.remove(&id),
            None => None,
        };

        receipt
    }
}

/// Deposits, withdrawals and transfers carry a payment method; derived records never do.
fn check_payment_method(
    transaction_type: TransactionType,
    payment_method: Option<PaymentMethod>,
) -> StoreResult<()> {
    match (transaction_type.requires_payment_method(), payment_method) {
        (true, None) => Err(StoreError::InvalidRecord(format!(
            "{transaction_type} record without a payment method"
        ))),
        (false, Some(method)) => Err(StoreError::InvalidRecord(format!(
            "{transaction_type} record with payment method {method}"
        ))),
        _ => Ok(()),
    }
}

/// Process-local store guarded by a single reader-writer lock.
///
/// A commit validates and applies under one write guard, so readers never
/// observe a half-applied commit.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
}

impl InMemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn account(&self, number: &AccountNumber) -> StoreResult<Option<Account>> {
        Ok(self.tables.read().accounts.get(number).cloned())
    }

    async fn accounts(&self, status: Option<AccountStatus>) -> StoreResult<Vec<Account>> {
        let tables = self.tables.read();
        let mut accounts: Vec<Account> = tables
            .accounts
            .values()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn transaction(&self, id: TransactionId) -> StoreResult<Option<Transaction>> {
        Ok(self.tables.read().transactions.get(&id).cloned())
    }

    async fn transactions(&self, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .tables
            .read()
            .transactions
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn count_transactions(&self, owner: &AccountNumber) -> StoreResult<usize> {
        Ok(self
            .tables
            .read()
            .transactions
            .values()
            .filter(|t| &t.account_number == owner)
            .count())
    }

    async fn is_reversed(&self, id: TransactionId) -> StoreResult<bool> {
        Ok(self.tables.read().reversed.contains(&id))
    }

    async fn commit(&self, commit: Commit) -> StoreResult<CommitReceipt> {
        let mut tables = self.tables.write();
        tables.validate(&commit)?;
        let receipt = tables.apply(commit);
        debug!(
            accounts = receipt.accounts.len(),
            transaction = ?receipt.transaction.as_ref().map(|t| t.id),
            "Commit applied"
        );
        Ok(receipt)
    }
}
