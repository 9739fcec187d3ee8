//! The pending transaction queue.
//!
//! Callers append under a short-held lock and return. The worker swaps the
//! whole pending list out in one step and executes it outside the lock.
//!
//! ```text
//!   enqueue ──► pending ──(mem::take)──► batch (in flight) ──► storage
//! ```
//!
//! `pending_count` covers both the list and the batch in flight, so it only
//! reaches zero once every accepted transaction has been executed.

use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use crate::types::TransactionId;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A transaction with the identifier it was given at enqueue.
#[derive(Debug)]
pub(crate) struct Queued {
    pub(crate) id: TransactionId,
    pub(crate) transaction: Transaction,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: Vec<Queued>,
    in_flight: usize,
    next_id: u64,
    shutting_down: bool,
    disconnected: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight == 0
    }
}

/// Pending transactions shared between callers and the worker.
#[derive(Debug)]
pub struct TransactionQueue {
    state: Mutex<QueueState>,
    /// Signalled on enqueue and on shutdown.
    work: Condvar,
    /// Signalled when the queue becomes idle or disconnects.
    settled: Condvar,
    capacity: Option<usize>,
}

impl TransactionQueue {
    /// Creates a queue, bounded when `capacity` is set.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            work: Condvar::new(),
            settled: Condvar::new(),
            capacity,
        }
    }

    /// Appends `transaction` and wakes the worker.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` once the worker has disconnected, or
    /// `QueueFull` when a capacity is set and already reached.
    pub fn push(&self, transaction: Transaction) -> CoreResult<TransactionId> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(CoreError::DatabaseClosed);
        }
        if let Some(capacity) = self.capacity {
            if state.pending.len() >= capacity {
                return Err(CoreError::QueueFull { capacity });
            }
        }

        state.next_id += 1;
        let id = TransactionId::new(state.next_id);
        state.pending.push(Queued { id, transaction });
        drop(state);

        self.work.notify_one();
        Ok(id)
    }

    /// Transactions accepted but not yet executed.
    pub fn pending_count(&self) -> usize {
        let state = self.state.lock();
        state.pending.len() + state.in_flight
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    /// Whether the worker has stopped and the queue refuses new work.
    pub fn is_disconnected(&self) -> bool {
        self.state.lock().disconnected
    }

    /// Asks the worker to stop once the queue is empty.
    pub fn begin_shutdown(&self) {
        self.state.lock().shutting_down = true;
        self.work.notify_all();
    }

    /// Blocks until nothing is pending or in flight, or `timeout` elapses.
    ///
    /// Returns whether the queue was idle on return.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.is_idle() {
            if self.settled.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    /// Takes the next batch for the worker.
    ///
    /// Waits up to `idle` at a time while the queue is empty. Returns `None`
    /// when shutdown was requested and nothing is left; the queue is marked
    /// disconnected in the same critical section, so no transaction can be
    /// accepted after the worker's last look.
    pub(crate) fn next_batch(&self, idle: Duration) -> Option<Vec<Queued>> {
        let mut state = self.state.lock();
        loop {
            if !state.pending.is_empty() {
                let batch = std::mem::take(&mut state.pending);
                state.in_flight = batch.len();
                return Some(batch);
            }
            if state.shutting_down {
                state.disconnected = true;
                drop(state);
                self.settled.notify_all();
                return None;
            }
            self.work.wait_for(&mut state, idle);
        }
    }

    /// Marks one in-flight transaction as executed.
    pub(crate) fn complete_one(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        let idle = state.is_idle();
        drop(state);
        if idle {
            self.settled.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn txn(n: i64) -> Transaction {
        Transaction::delete("c", "n", n)
    }

    #[test]
    fn ids_are_monotonic() {
        let queue = TransactionQueue::new(None);
        let a = queue.push(txn(1)).unwrap();
        let b = queue.push(txn(2)).unwrap();
        assert!(a < b);
        assert_eq!(queue.pending_count(), 2);
    }

    #[test]
    fn batch_preserves_submission_order() {
        let queue = TransactionQueue::new(None);
        for n in 0..5 {
            queue.push(txn(n)).unwrap();
        }

        let batch = queue.next_batch(Duration::from_millis(1)).unwrap();
        let ids: Vec<u64> = batch.iter().map(|q| q.id.as_u64()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        // Still counted while in flight.
        assert_eq!(queue.pending_count(), 5);
        for _ in 0..5 {
            queue.complete_one();
        }
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn capacity_rejects_without_blocking() {
        let queue = TransactionQueue::new(Some(2));
        queue.push(txn(1)).unwrap();
        queue.push(txn(2)).unwrap();
        let result = queue.push(txn(3));
        assert!(matches!(result, Err(CoreError::QueueFull { capacity: 2 })));
    }

    #[test]
    fn shutdown_drains_before_disconnecting() {
        let queue = TransactionQueue::new(None);
        queue.push(txn(1)).unwrap();
        queue.begin_shutdown();

        // Work submitted during shutdown is still accepted and drained.
        queue.push(txn(2)).unwrap();
        let batch = queue.next_batch(Duration::from_millis(1)).unwrap();
        assert_eq!(batch.len(), 2);
        queue.complete_one();
        queue.complete_one();

        assert!(queue.next_batch(Duration::from_millis(1)).is_none());
        assert!(queue.is_disconnected());
        assert!(matches!(queue.push(txn(3)), Err(CoreError::DatabaseClosed)));
    }

    #[test]
    fn wait_idle_times_out_while_pending() {
        let queue = TransactionQueue::new(None);
        queue.push(txn(1)).unwrap();
        assert!(!queue.wait_idle(Duration::from_millis(20)));
    }

    #[test]
    fn wait_idle_wakes_on_completion() {
        let queue = Arc::new(TransactionQueue::new(None));
        queue.push(txn(1)).unwrap();

        let worker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let batch = queue.next_batch(Duration::from_millis(1)).unwrap();
                thread::sleep(Duration::from_millis(10));
                for _ in batch {
                    queue.complete_one();
                }
            })
        };

        assert!(queue.wait_idle(Duration::from_secs(5)));
        worker.join().unwrap();
    }

    #[test]
    fn concurrent_pushes_are_all_counted() {
        let queue = Arc::new(TransactionQueue::new(None));
        let mut handles = vec![];
        for t in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                for n in 0..100 {
                    queue.push(txn(t * 100 + n)).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(queue.pending_count(), 800);
    }
}
