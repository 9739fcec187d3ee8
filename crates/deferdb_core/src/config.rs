//! Database configuration.

use deferdb_storage::FileOptions;
use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Longest the worker sleeps when it finds the queue empty.
    pub idle_interval: Duration,

    /// Maximum pending transactions before `enqueue` is refused (None = unbounded).
    pub queue_capacity: Option<usize>,

    /// Name given to the worker thread.
    pub worker_name: String,

    /// Number of failed transactions kept for [`crate::Database::recent_failures`].
    pub failure_history: usize,

    /// Options for file-backed databases.
    pub file: FileOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(10),
            queue_capacity: None,
            worker_name: "deferdb-worker".to_string(),
            failure_history: 256,
            file: FileOptions::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the idle poll interval.
    #[must_use]
    pub const fn idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Bounds the pending queue.
    #[must_use]
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Sets the worker thread name.
    #[must_use]
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Sets how many failures are kept in history.
    #[must_use]
    pub const fn failure_history(mut self, size: usize) -> Self {
        self.failure_history = size;
        self
    }

    /// Sets file backend options.
    #[must_use]
    pub const fn file_options(mut self, options: FileOptions) -> Self {
        self.file = options;
        self
    }
}
