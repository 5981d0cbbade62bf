//! Post-commit notifications.
//!
//! Notifications are best effort. The engine enqueues them after a commit
//! has been applied; a background worker hands them to the [`Notifier`]
//! with a deadline. Delivery failures are logged and never reach the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;
use crate::transaction::Transaction;

/// What happened to the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// A new record was committed.
    Committed,
    /// An existing record was rewritten by an update.
    Updated,
    /// A record was deleted.
    Removed,
}

/// A committed change, addressed to the owning account's holder.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub transaction: Transaction,
    pub holder_name: String,
    /// Contact address. Notifications without one are not delivered.
    pub contact: Option<String>,
}

impl Notification {
    pub fn subject(&self) -> &'static str {
        "Transaction Notification"
    }

    /// Plain-text message body.
    pub fn body(&self) -> String {
        let t = &self.transaction;
        let headline = match self.kind {
            NotificationKind::Committed => "A transaction has been processed on your account:",
            NotificationKind::Updated => "A transaction on your account has been updated:",
            NotificationKind::Removed => "A transaction has been removed from your account:",
        };
        let method = t
            .payment_method
            .map(|m| m.to_string())
            .unwrap_or_else(|| "N/A".to_string());

        format!(
            "Dear {},\n\n{}\nType: {}\nAmount: ${}\nPayment Method: {}\nDate: {}\nDescription: {}\n\nThank you for banking with us!",
            self.holder_name,
            headline,
            t.transaction_type,
            t.amount,
            method,
            t.timestamp.to_rfc3339(),
            t.description,
        )
    }

    fn has_contact(&self) -> bool {
        self.contact.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// Notification delivery errors.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Notification rendering failed: {0}")]
    Render(#[from] serde_json::Error),
}

/// Receives committed changes.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of sending them anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(&notification.transaction)?;
        info!(
            to = notification.contact.as_deref().unwrap_or_default(),
            subject = notification.subject(),
            body = %notification.body(),
            transaction = %payload,
            "Notification delivered"
        );
        Ok(())
    }
}

/// Bounded queue in front of a [`Notifier`], drained by a background task.
///
/// The worker stops once every dispatcher clone is dropped and the queue is empty.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Start the delivery worker. Must be called from inside a tokio runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>, config: &NotificationConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        tokio::spawn(deliver(notifier, rx, config.delivery_timeout));
        Self { tx }
    }

    /// Queue a notification without waiting.
    ///
    /// Dropped with a warning when the queue is full or the worker is gone.
    pub fn enqueue(&self, notification: Notification) {
        if !notification.has_contact() {
            debug!(
                transaction_id = %notification.transaction.id,
                "No contact address, notification skipped"
            );
            return;
        }

        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                warn!(transaction_id = %n.transaction.id, "Notification queue full, dropping");
            }
            Err(TrySendError::Closed(n)) => {
                warn!(transaction_id = %n.transaction.id, "Notification worker stopped, dropping");
            }
        }
    }
}

async fn deliver(
    notifier: Arc<dyn Notifier>,
    mut rx: mpsc::Receiver<Notification>,
    delivery_timeout: Duration,
) {
    while let Some(notification) = rx.recv().await {
        let transaction_id = notification.transaction.id;
        match tokio::time::timeout(delivery_timeout, notifier.notify(&notification)).await {
            Ok(Ok(())) => debug!(transaction_id = %transaction_id, "Notification sent"),
            Ok(Err(e)) => {
                warn!(transaction_id = %transaction_id, error = %e, "Notification failed")
            }
            Err(_) => warn!(
                transaction_id = %transaction_id,
                timeout_ms = delivery_timeout.as_millis() as u64,
                "Notification timed out"
            ),
        }
    }
    debug!("Notification worker stopped");
}

/// Notifier that forwards every notification to a channel.
#[cfg(any(test, feature = "test-utils"))]
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingNotifier {
    /// Create a notifier and the receiving end of its recording.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.tx
            .send(notification.clone())
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{PaymentMethod, TransactionDraft};
    use corebank_common::{AccountNumber, TransactionId};
    use rust_decimal_macros::dec;

    fn notification(amount: rust_decimal::Decimal, contact: Option<&str>) -> Notification {
        let transaction = TransactionDraft::deposit(
            &AccountNumber::from("ACC-1"),
            amount,
            PaymentMethod::Paypal,
        )
        .into_transaction(TransactionId::new(1));
        Notification {
            kind: NotificationKind::Committed,
            transaction,
            holder_name: "Ada".to_string(),
            contact: contact.map(str::to_string),
        }
    }

    /// Fails on 2, hangs on 99, records everything else.
    struct PickyNotifier(RecordingNotifier);

    #[async_trait]
    impl Notifier for PickyNotifier {
        async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            if notification.transaction.amount == dec!(99) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if notification.transaction.amount == dec!(2) {
                return Err(NotifyError::Delivery("smtp down".to_string()));
            }
            self.0.notify(notification).await
        }
    }

    fn config() -> NotificationConfig {
        NotificationConfig {
            queue_capacity: 8,
            delivery_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_body() {
        let body = notification(dec!(12.50), Some("ada@example.com")).body();
        assert!(body.starts_with("Dear Ada,"));
        assert!(body.contains("Type: DEPOSIT"));
        assert!(body.contains("Amount: $12.50"));
        assert!(body.contains("Payment Method: PAYPAL"));
        assert!(body.contains("Description: Deposit to account ACC-1"));
    }

    #[tokio::test]
    async fn test_dispatch_delivers() {
        let (recorder, mut rx) = RecordingNotifier::new();
        let dispatcher = NotificationDispatcher::spawn(Arc::new(recorder), &config());

        dispatcher.enqueue(notification(dec!(5), Some("ada@example.com")));
        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.transaction.amount, dec!(5));
    }

    #[tokio::test]
    async fn test_no_contact_is_skipped() {
        let (recorder, mut rx) = RecordingNotifier::new();
        let dispatcher = NotificationDispatcher::spawn(Arc::new(recorder), &config());

        dispatcher.enqueue(notification(dec!(5), None));
        dispatcher.enqueue(notification(dec!(6), Some("  ")));
        dispatcher.enqueue(notification(dec!(7), Some("ada@example.com")));

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.transaction.amount, dec!(7));
    }

    #[tokio::test]
    async fn test_worker_survives_failure_and_timeout() {
        let (recorder, mut rx) = RecordingNotifier::new();
        let dispatcher =
            NotificationDispatcher::spawn(Arc::new(PickyNotifier(recorder)), &config());

        dispatcher.enqueue(notification(dec!(2), Some("ada@example.com")));
        dispatcher.enqueue(notification(dec!(99), Some("ada@example.com")));
        dispatcher.enqueue(notification(dec!(3), Some("ada@example.com")));

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.transaction.amount, dec!(3));
    }

    #[tokio::test]
    async fn test_log_notifier() {
        LogNotifier
            .notify(&notification(dec!(1), Some("ada@example.com")))
            .await
            .unwrap();
    }
}
