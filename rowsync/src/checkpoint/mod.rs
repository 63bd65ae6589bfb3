//! Durable stream-position tracking with an external reset protocol.

pub mod kv;
pub mod store;

pub use kv::{KvStore, MemoryKvStore};
pub use store::{CheckpointStore, SaveOutcome};
