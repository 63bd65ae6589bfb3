//! Config-driven reconciliation of change events into target-store writes.

pub mod base;
pub mod config;
pub mod engine;
pub mod memory;
pub mod snapshot;

pub use base::{ConfigStore, SyncReader, SyncWriter};
pub use config::{ReaderConfig, SyncFlags, WriterConfig};
pub use engine::{Intent, SyncEngine, decide};
pub use snapshot::{ConfigCache, ConfigPair, ConfigSnapshot};
