//! Operator-visible feed of transactions whose storage call failed.
//!
//! Callers of `save()` and `delete()` have already returned by the time a
//! write runs, so failures go here and to the log instead of back to them.

use crate::types::{TransactionId, TransactionKind};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

/// A transaction the worker executed without success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTransaction {
    /// Identifier assigned at enqueue.
    pub id: TransactionId,
    /// Target collection.
    pub collection: String,
    /// Upsert or delete.
    pub kind: TransactionKind,
    /// Rendered error.
    pub error: String,
}

/// Distributes failures to subscribers and keeps a bounded history.
pub struct FailureFeed {
    subscribers: RwLock<Vec<Sender<FailedTransaction>>>,
    history: RwLock<VecDeque<FailedTransaction>>,
    max_history: usize,
}

impl FailureFeed {
    /// Creates a feed keeping at most `max_history` failures.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
        }
    }

    /// Returns a receiver for every failure published from now on.
    pub fn subscribe(&self) -> Receiver<FailedTransaction> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Records `failure` and sends it to live subscribers.
    pub fn publish(&self, failure: FailedTransaction) {
        if self.max_history > 0 {
            let mut history = self.history.write();
            if history.len() == self.max_history {
                history.pop_front();
            }
            history.push_back(failure.clone());
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(failure.clone()).is_ok());
    }

    /// Failures still in history, oldest first.
    pub fn recent(&self) -> Vec<FailedTransaction> {
        self.history.read().iter().cloned().collect()
    }

    /// Number of connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for FailureFeed {
    fn default() -> Self {
        Self::with_max_history(256)
    }
}

impl std::fmt::Debug for FailureFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureFeed")
            .field("subscribers", &self.subscriber_count())
            .field("history", &self.history.read().len())
            .field("max_history", &self.max_history)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn failure(id: u64) -> FailedTransaction {
        FailedTransaction {
            id: TransactionId::new(id),
            collection: "users".into(),
            kind: TransactionKind::Upsert,
            error: "boom".into(),
        }
    }

    #[test]
    fn publish_and_receive() {
        let feed = FailureFeed::default();
        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();

        feed.publish(failure(1));

        assert_eq!(rx1.recv_timeout(Duration::from_millis(100)).unwrap(), failure(1));
        assert_eq!(rx2.recv_timeout(Duration::from_millis(100)).unwrap(), failure(1));
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = FailureFeed::default();
        let rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(rx);
        feed.publish(failure(1));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn history_is_bounded() {
        let feed = FailureFeed::with_max_history(3);
        for i in 1..=5 {
            feed.publish(failure(i));
        }

        let ids: Vec<u64> = feed.recent().iter().map(|f| f.id.as_u64()).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn zero_history_keeps_nothing() {
        let feed = FailureFeed::with_max_history(0);
        feed.publish(failure(1));
        assert!(feed.recent().is_empty());
    }
}
