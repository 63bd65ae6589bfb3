use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for the ordered sharded worker pool.
///
/// The pool owns a fixed set of single-consumer lanes; events sharing an
/// ordering key always land on the same lane, so lane count and queue depth
/// bound both parallelism and admission backpressure.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerPoolConfig {
    /// Number of worker lanes. Must be a power of two since shard selection
    /// masks the key hash with `workers - 1`.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum number of events queued per lane before admission blocks.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Maximum time, in milliseconds, an admission waits for queue space
    /// before failing back to the producer.
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
}

impl WorkerPoolConfig {
    /// Default number of worker lanes.
    pub const DEFAULT_WORKERS: usize = 16;

    /// Default per-lane queue capacity.
    pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

    /// Default admission timeout in milliseconds.
    pub const DEFAULT_ENQUEUE_TIMEOUT_MS: u64 = 1000;

    /// Validates worker pool settings.
    ///
    /// Ensures the lane count is a non-zero power of two and queues are
    /// non-empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 || !self.workers.is_power_of_two() {
            return Err(ValidationError::InvalidFieldValue {
                field: "pool.workers",
                constraint: "must be a non-zero power of two",
            });
        }

        if self.queue_capacity == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pool.queue_capacity",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
        }
    }
}

fn default_workers() -> usize {
    WorkerPoolConfig::DEFAULT_WORKERS
}

fn default_queue_capacity() -> usize {
    WorkerPoolConfig::DEFAULT_QUEUE_CAPACITY
}

fn default_enqueue_timeout_ms() -> u64 {
    WorkerPoolConfig::DEFAULT_ENQUEUE_TIMEOUT_MS
}
