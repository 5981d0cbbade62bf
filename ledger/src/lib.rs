//! Corebank Ledger Engine
//!
//! Account registry and transaction engine over a pluggable store, keeping
//! balances and the transaction log consistent under concurrent access.

pub mod account;
pub mod balance;
pub mod config;
pub mod engine;
pub mod locks;
pub mod notifier;
pub mod registry;
pub mod service;
pub mod store;
pub mod transaction;

pub use account::{Account, AccountStatus};
pub use balance::Reconciliation;
pub use config::{LedgerConfig, NotificationConfig};
pub use engine::{CreateTransaction, TransactionEngine, TransactionUpdate};
pub use locks::{AccountGuard, AccountLocks};
pub use notifier::{
    LogNotifier, Notification, NotificationDispatcher, NotificationKind, Notifier, NotifyError,
};
pub use registry::{AccountNumberGenerator, AccountRegistry, AccountUpdate, NewAccount, UuidAccountNumbers};
pub use service::{LedgerService, LedgerServiceBuilder};
pub use store::{
    AccountWrite, Commit, CommitReceipt, InMemoryLedgerStore, LedgerStore, TransactionFilter,
    TransactionWrite,
};
pub use transaction::{PaymentMethod, Transaction, TransactionDraft, TransactionType};

#[cfg(any(test, feature = "test-utils"))]
pub use notifier::RecordingNotifier;
