//! The background worker that drains the queue.

use crate::database::Shared;
use crate::error::{CoreError, CoreResult};
use crate::failures::FailedTransaction;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Spawns the worker thread for `shared`.
pub(crate) fn spawn(shared: Arc<Shared>) -> CoreResult<JoinHandle<()>> {
    let name = shared.config.worker_name.clone();
    thread::Builder::new()
        .name(name)
        .spawn(move || run(&shared))
        .map_err(CoreError::from)
}

/// Loops until shutdown is requested and the queue is empty.
///
/// Each batch executes in the order it was swapped out. A failed
/// transaction is reported and dropped; the loop moves on to the next one.
fn run(shared: &Shared) {
    let idle = shared.config.idle_interval;
    info!(worker = %shared.config.worker_name, "worker started");

    while let Some(batch) = shared.queue.next_batch(idle) {
        shared.stats.record_drain();
        debug!(count = batch.len(), "draining transactions");

        for queued in batch {
            let transaction = &queued.transaction;
            match transaction.execute(shared.backend.as_ref()) {
                Ok(outcome) => shared.stats.record_executed(outcome),
                Err(err) => {
                    error!(
                        id = %queued.id,
                        collection = transaction.collection(),
                        kind = %transaction.kind(),
                        error = %err,
                        "transaction failed"
                    );
                    shared.stats.record_failed();
                    shared.failures.publish(FailedTransaction {
                        id: queued.id,
                        collection: transaction.collection().to_string(),
                        kind: transaction.kind(),
                        error: err.to_string(),
                    });
                }
            }
            shared.queue.complete_one();
        }
    }

    info!(worker = %shared.config.worker_name, "worker stopped");
}
