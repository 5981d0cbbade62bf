//! Wiring of store, locks, registry, notifications and engine.

use std::sync::Arc;

use tracing::info;

use crate::config::LedgerConfig;
use crate::engine::TransactionEngine;
use crate::locks::AccountLocks;
use crate::notifier::{LogNotifier, NotificationDispatcher, Notifier};
use crate::registry::{AccountNumberGenerator, AccountRegistry, UuidAccountNumbers};
use crate::store::{InMemoryLedgerStore, LedgerStore};

/// A fully wired ledger. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct LedgerService {
    registry: Arc<AccountRegistry>,
    engine: Arc<TransactionEngine>,
    store: Arc<dyn LedgerStore>,
}

impl LedgerService {
    /// Start building a ledger from a configuration.
    pub fn builder(config: LedgerConfig) -> LedgerServiceBuilder {
        LedgerServiceBuilder {
            config,
            store: None,
            generator: None,
            notifier: None,
        }
    }

    /// Account registry: creation, profile updates and lifecycle.
    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    /// Transaction engine: money movement, history edits and queries.
    pub fn engine(&self) -> &TransactionEngine {
        &self.engine
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }
}

/// Builder for [`LedgerService`]. Unset parts fall back to the in-memory
/// store, UUID account numbers and the logging notifier.
pub struct LedgerServiceBuilder {
    config: LedgerConfig,
    store: Option<Arc<dyn LedgerStore>>,
    generator: Option<Arc<dyn AccountNumberGenerator>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl LedgerServiceBuilder {
    /// Use a custom store instead of the in-memory one.
    pub fn store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom account number source.
    pub fn account_numbers(mut self, generator: Arc<dyn AccountNumberGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Deliver notifications through `notifier` instead of the log.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Validate the configuration and wire everything up.
    ///
    /// Spawns the notification worker, so it must run inside a tokio runtime.
    pub fn build(self) -> Result<LedgerService, String> {
        self.config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryLedgerStore::new()));
        let generator = self
            .generator
            .unwrap_or_else(|| Arc::new(UuidAccountNumbers));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));

        let locks = Arc::new(AccountLocks::new());
        let registry = Arc::new(AccountRegistry::new(
            store.clone(),
            locks.clone(),
            generator,
            self.config.account_number_attempts,
        ));
        let dispatcher = NotificationDispatcher::spawn(notifier, &self.config.notification_config);
        let engine = Arc::new(TransactionEngine::new(
            store.clone(),
            registry.clone(),
            locks,
            dispatcher,
        ));

        info!(
            queue_capacity = self.config.notification_config.queue_capacity,
            "Ledger service ready"
        );

        Ok(LedgerService {
            registry,
            engine,
            store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NewAccount;
    use crate::transaction::PaymentMethod;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_build_default() {
        let ledger = LedgerService::builder(LedgerConfig::default()).build().unwrap();
        let account = ledger
            .registry()
            .create(NewAccount::new("Ada", "SAVINGS"))
            .await
            .unwrap();
        ledger
            .engine()
            .deposit(account.account_number.as_str(), dec!(5), PaymentMethod::Paypal)
            .await
            .unwrap();

        let clone = ledger.clone();
        let stored = clone.registry().get(account.account_number.as_str()).await.unwrap();
        assert_eq!(stored.balance, dec!(5));
        assert_eq!(ledger.store().accounts(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let mut config = LedgerConfig::default();
        config.account_number_attempts = 0;
        assert!(LedgerService::builder(config).build().is_err());
    }
}
