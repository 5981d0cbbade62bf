//! Ledger configuration.

use std::time::Duration;

/// Notification delivery configuration.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Capacity of the post-commit notification queue.
    pub queue_capacity: usize,
    /// How long a single delivery may take before it is abandoned.
    pub delivery_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            delivery_timeout: Duration::from_secs(5),
        }
    }
}

/// Main ledger configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Notification configuration.
    pub notification_config: NotificationConfig,
    /// How many fresh account numbers to draw before giving up on a collision.
    pub account_number_attempts: usize,
    /// Log level.
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            notification_config: NotificationConfig::default(),
            account_number_attempts: 3,
            log_level: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(capacity) = std::env::var("COREBANK_NOTIFICATION_CAPACITY") {
            if let Ok(capacity) = capacity.parse() {
                config.notification_config.queue_capacity = capacity;
            }
        }

        if let Ok(timeout) = std::env::var("COREBANK_NOTIFY_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                config.notification_config.delivery_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(attempts) = std::env::var("COREBANK_ACCOUNT_NUMBER_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse() {
                config.account_number_attempts = attempts;
            }
        }

        if let Ok(level) = std::env::var("COREBANK_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.notification_config.queue_capacity == 0 {
            return Err("Notification queue capacity cannot be 0".to_string());
        }

        if self.notification_config.delivery_timeout.is_zero() {
            return Err("Notification timeout cannot be 0".to_string());
        }

        if self.account_number_attempts == 0 {
            return Err("Account number attempts must be at least 1".to_string());
        }

        Ok(())
    }
}
