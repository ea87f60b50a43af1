//! Hand-off to an event service that reports when transactions commit

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use fabric_core::TransactionId;
use fabric_logging::LOG_CHANNEL;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxEventError {
    /// The transaction made it into a block but failed validation
    #[error("Transaction is invalid with validation code {code}")]
    Invalid { code: i32 },
    #[error("Event source disconnected: {0}")]
    Disconnected(String),
}

/// Called once with the outcome of the transaction
pub type TxEventCallback = Box<dyn FnOnce(TransactionId, Result<(), TxEventError>) + Send>;

pub type DynTxEventNotifier = Arc<dyn ITxEventNotifier>;

/// A service watching committed blocks for transactions
///
/// Registration never blocks; the callback runs on whatever task observes
/// the commit.
pub trait ITxEventNotifier: fmt::Debug + Send + Sync + 'static {
    fn register_tx_event(&self, tx_id: TransactionId, callback: TxEventCallback);

    fn unregister_tx_event(&self, tx_id: &TransactionId);

    fn into_dyn(self) -> DynTxEventNotifier
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

/// Notifier fed by hand, for tests and for embedding into other event
/// sources
#[derive(Default)]
pub struct InMemoryTxEventNotifier {
    pending: Mutex<BTreeMap<TransactionId, TxEventCallback>>,
}

impl fmt::Debug for InMemoryTxEventNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTxEventNotifier")
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl InMemoryTxEventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the outcome of `tx_id`; returns whether anyone was waiting
    pub fn notify(&self, tx_id: &TransactionId, outcome: Result<(), TxEventError>) -> bool {
        // don't hold the lock while running the callback
        let callback = self.pending.lock().expect("lock poison").remove(tx_id);
        match callback {
            Some(callback) => {
                callback(tx_id.clone(), outcome);
                true
            }
            None => {
                debug!(target: LOG_CHANNEL, %tx_id, "No listener for transaction event");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("lock poison").len()
    }
}

impl ITxEventNotifier for InMemoryTxEventNotifier {
    fn register_tx_event(&self, tx_id: TransactionId, callback: TxEventCallback) {
        let replaced = self
            .pending
            .lock()
            .expect("lock poison")
            .insert(tx_id.clone(), callback);
        if replaced.is_some() {
            warn!(target: LOG_CHANNEL, %tx_id, "Replaced existing transaction listener");
        }
    }

    fn unregister_tx_event(&self, tx_id: &TransactionId) {
        self.pending.lock().expect("lock poison").remove(tx_id);
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn callback_receives_outcome() -> anyhow::Result<()> {
        let notifier = InMemoryTxEventNotifier::new();
        let tx_id = TransactionId::from("abcd".to_owned());
        let (tx, rx) = oneshot::channel();

        notifier.register_tx_event(
            tx_id.clone(),
            Box::new(move |id, outcome| {
                let _ = tx.send((id, outcome));
            }),
        );
        assert_eq!(notifier.pending_count(), 1);

        assert!(notifier.notify(&tx_id, Err(TxEventError::Invalid { code: 11 })));
        let (id, outcome) = rx.await?;
        assert_eq!(id, tx_id);
        assert_eq!(outcome, Err(TxEventError::Invalid { code: 11 }));
        assert_eq!(notifier.pending_count(), 0);
        Ok(())
    }

    #[test]
    fn unregistered_events_are_dropped() {
        let notifier = InMemoryTxEventNotifier::new();
        let tx_id = TransactionId::from("abcd".to_owned());
        notifier.register_tx_event(tx_id.clone(), Box::new(|_, _| panic!("must not run")));
        notifier.unregister_tx_event(&tx_id);
        assert!(!notifier.notify(&tx_id, Ok(())));
    }
}
