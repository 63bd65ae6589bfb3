//! Ordered event processing workers.

mod pool;

pub use pool::ShardedWorkerPool;
