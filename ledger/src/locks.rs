//! Per-account lock management.
//!
//! Every read-compute-commit cycle runs while holding the locks of the
//! accounts it touches. Locks are always taken in ascending account-number
//! order, so two operations naming the same pair of accounts in opposite
//! directions cannot deadlock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use corebank_common::AccountNumber;

type LockTable = DashMap<AccountNumber, Arc<Mutex<()>>>;

/// Locks held for a set of accounts. Released on drop.
///
/// Dropping the guard also evicts every mutex it held that no other task
/// is holding or waiting on, so the table only grows with live contention.
#[derive(Debug)]
pub struct AccountGuard {
    table: Arc<LockTable>,
    accounts: Vec<AccountNumber>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        self.guards.clear();
        for number in &self.accounts {
            // The shard lock is held while the count is read, so a task
            // cloning the mutex in `mutex_for` is either counted or inserts anew.
            if self
                .table
                .remove_if(number, |_, mutex| Arc::strong_count(mutex) == 1)
                .is_some()
            {
                trace!(account = %number, "Account lock evicted");
            }
        }
    }
}

/// Registry of account mutexes, created on first use.
#[derive(Debug, Default)]
pub struct AccountLocks {
    table: Arc<LockTable>,
}

impl AccountLocks {
    /// Create a new lock registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, number: &AccountNumber) -> Arc<Mutex<()>> {
        self.table
            .entry(number.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock every named account, in ascending order, waiting as needed.
    ///
    /// Duplicate numbers are locked once.
    pub async fn acquire<'a, I>(&self, numbers: I) -> AccountGuard
    where
        I: IntoIterator<Item = &'a AccountNumber>,
    {
        let mut accounts: Vec<AccountNumber> = numbers.into_iter().cloned().collect();
        accounts.sort();
        accounts.dedup();

        let mut guard = AccountGuard {
            table: self.table.clone(),
            accounts: Vec::with_capacity(accounts.len()),
            guards: Vec::with_capacity(accounts.len()),
        };
        for number in accounts {
            // The DashMap shard guard is released before awaiting.
            let mutex = self.mutex_for(&number);
            guard.guards.push(mutex.lock_owned().await);
            trace!(account = %number, "Account lock acquired");
            guard.accounts.push(number);
        }
        guard
    }

    /// Number of accounts with a mutex allocated.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_sorts_and_dedups() {
        let locks = AccountLocks::new();
        let b = AccountNumber::from("B");
        let a = AccountNumber::from("A");

        let guard = locks.acquire([&b, &a, &b]).await;
        assert_eq!(guard.accounts, vec![a.clone(), b.clone()]);
        assert_eq!(guard.guards.len(), 2);
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_locks_are_evicted() {
        let locks = AccountLocks::new();
        for i in 0..100 {
            let number = AccountNumber::new(format!("ACC-{i}"));
            drop(locks.acquire([&number]).await);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_keeps_lock_entry() {
        let locks = Arc::new(AccountLocks::new());
        let a = AccountNumber::from("A");
        let guard = locks.acquire([&a]).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let contender = {
            let locks = locks.clone();
            let a = a.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire([&a]).await;
                let _ = release_rx.await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // the contender still needs the same mutex
        drop(guard);
        assert_eq!(locks.len(), 1);

        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let locks = Arc::new(AccountLocks::new());
        let a = AccountNumber::from("A");

        let guard = locks.acquire([&a]).await;

        let contender = {
            let locks = locks.clone();
            let a = a.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire([&a]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_order_does_not_deadlock() {
        let locks = Arc::new(AccountLocks::new());
        let a = AccountNumber::from("A");
        let b = AccountNumber::from("B");

        let mut handles = Vec::new();
        for i in 0..50 {
            let locks = locks.clone();
            let (first, second) = if i % 2 == 0 {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            };
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire([&first, &second]).await;
                tokio::task::yield_now().await;
            }));
        }

        tokio::time::timeout(Duration::from_secs(5), futures::future::join_all(handles))
            .await
            .expect("lock ordering must prevent deadlock");
        assert!(locks.is_empty());
    }
}
