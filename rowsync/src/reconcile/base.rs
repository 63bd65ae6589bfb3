use std::future::Future;

use crate::error::SyncResult;
use crate::reconcile::config::{ReaderConfig, WriterConfig};
use crate::types::{ChangeEvent, Entity};

/// Source-of-truth read path the engine resolves rows and projections from.
///
/// Implementations wrap a concrete relational client; the engine only ever
/// calls them with a config whose `db.table` matches the event, and never
/// retries on its own.
pub trait SyncReader: Send + Sync {
    /// Fetches the complete current row (plus any joined projection the
    /// writer needs) for the event's primary key. `None` means the row no
    /// longer exists.
    fn whole_row(
        &self,
        config: &ReaderConfig,
        event: &ChangeEvent,
    ) -> impl Future<Output = SyncResult<Option<Entity>>> + Send;

    /// Fetches the partial projection used for a query-based update. `None`
    /// or an empty projection means there is nothing to write.
    fn update_projection(
        &self,
        config: &ReaderConfig,
        event: &ChangeEvent,
    ) -> impl Future<Output = SyncResult<Option<Entity>>> + Send;

    /// Counts the rows affected by a related-row change.
    fn count_affected(
        &self,
        config: &ReaderConfig,
        event: &ChangeEvent,
    ) -> impl Future<Output = SyncResult<u64>> + Send;

    /// Fetches one page of affected rows.
    fn page(
        &self,
        config: &ReaderConfig,
        event: &ChangeEvent,
        offset: u64,
        limit: u64,
    ) -> impl Future<Output = SyncResult<Vec<Entity>>> + Send;
}

/// Target-store write path the engine executes decisions against.
pub trait SyncWriter: Send + Sync {
    /// Upserts complete rows into the target.
    fn upsert(
        &self,
        config: &WriterConfig,
        rows: Vec<Entity>,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Applies a query-based partial update from a projection.
    fn partial_update(
        &self,
        config: &WriterConfig,
        projection: Entity,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Deletes the target record addressed by the event's identity.
    fn delete(
        &self,
        config: &WriterConfig,
        event: &ChangeEvent,
    ) -> impl Future<Output = SyncResult<()>> + Send;
}

/// Durable store the reader/writer config pairs are loaded from.
///
/// Reads are bulk snapshots; there is no incremental diff protocol.
pub trait ConfigStore: Send + Sync {
    /// Loads every reader config.
    fn reader_configs(&self) -> impl Future<Output = SyncResult<Vec<ReaderConfig>>> + Send;

    /// Loads every writer config.
    fn writer_configs(&self) -> impl Future<Output = SyncResult<Vec<WriterConfig>>> + Send;
}
