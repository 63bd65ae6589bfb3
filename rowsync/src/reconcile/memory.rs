//! In-memory reader/writer/config-store implementations.
//!
//! Used by tests and local runs; every handle clones cheaply and shares the
//! same recorded state.

use std::sync::{Arc, Mutex};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::reconcile::base::{ConfigStore, SyncReader, SyncWriter};
use crate::reconcile::config::{ReaderConfig, WriterConfig};
use crate::types::{ChangeEvent, Entity};

/// One recorded call against a [`MemoryReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderCall {
    WholeRow,
    UpdateProjection,
    CountAffected,
    Page { offset: u64, limit: u64 },
}

#[derive(Default)]
struct ReaderInner {
    whole_row: Option<Entity>,
    projection: Option<Entity>,
    rows: Vec<Entity>,
    count_override: Option<u64>,
    calls: Vec<ReaderCall>,
}

/// Scriptable in-memory [`SyncReader`] that records every call.
#[derive(Clone, Default)]
pub struct MemoryReader {
    inner: Arc<Mutex<ReaderInner>>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the row returned by `whole_row`.
    pub fn set_whole_row(&self, row: Option<Entity>) {
        self.inner.lock().unwrap().whole_row = row;
    }

    /// Sets the projection returned by `update_projection`.
    pub fn set_projection(&self, projection: Option<Entity>) {
        self.inner.lock().unwrap().projection = projection;
    }

    /// Sets the backing rows served by `count_affected` and `page`.
    pub fn set_rows(&self, rows: Vec<Entity>) {
        self.inner.lock().unwrap().rows = rows;
    }

    /// Overrides the affected-row count independently of the backing rows,
    /// simulating a count that is stale relative to the pages.
    pub fn set_count(&self, count: u64) {
        self.inner.lock().unwrap().count_override = Some(count);
    }

    /// Returns the calls recorded so far.
    pub fn calls(&self) -> Vec<ReaderCall> {
        self.inner.lock().unwrap().calls.clone()
    }
}

impl SyncReader for MemoryReader {
    async fn whole_row(
        &self,
        _config: &ReaderConfig,
        _event: &ChangeEvent,
    ) -> SyncResult<Option<Entity>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ReaderCall::WholeRow);

        Ok(inner.whole_row.clone())
    }

    async fn update_projection(
        &self,
        _config: &ReaderConfig,
        _event: &ChangeEvent,
    ) -> SyncResult<Option<Entity>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ReaderCall::UpdateProjection);

        Ok(inner.projection.clone())
    }

    async fn count_affected(
        &self,
        _config: &ReaderConfig,
        _event: &ChangeEvent,
    ) -> SyncResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ReaderCall::CountAffected);

        Ok(inner
            .count_override
            .unwrap_or(inner.rows.len() as u64))
    }

    async fn page(
        &self,
        _config: &ReaderConfig,
        _event: &ChangeEvent,
        offset: u64,
        limit: u64,
    ) -> SyncResult<Vec<Entity>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(ReaderCall::Page { offset, limit });

        let start = (offset as usize).min(inner.rows.len());
        let end = (start + limit as usize).min(inner.rows.len());

        Ok(inner.rows[start..end].to_vec())
    }
}

/// One recorded call against a [`MemoryWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterCall {
    Upsert { rows: usize },
    PartialUpdate,
    Delete,
}

#[derive(Default)]
struct WriterInner {
    fail_writes: bool,
    calls: Vec<WriterCall>,
}

/// Recording in-memory [`SyncWriter`].
#[derive(Clone, Default)]
pub struct MemoryWriter {
    inner: Arc<Mutex<WriterInner>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_writes = fail;
    }

    /// Returns the calls recorded so far.
    pub fn calls(&self) -> Vec<WriterCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn record(&self, call: WriterCall) -> SyncResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            bail!(ErrorKind::DestinationWriteFailed, "Write failed");
        }

        inner.calls.push(call);

        Ok(())
    }
}

impl SyncWriter for MemoryWriter {
    async fn upsert(&self, _config: &WriterConfig, rows: Vec<Entity>) -> SyncResult<()> {
        self.record(WriterCall::Upsert { rows: rows.len() })
    }

    async fn partial_update(&self, _config: &WriterConfig, _projection: Entity) -> SyncResult<()> {
        self.record(WriterCall::PartialUpdate)
    }

    async fn delete(&self, _config: &WriterConfig, _event: &ChangeEvent) -> SyncResult<()> {
        self.record(WriterCall::Delete)
    }
}

#[derive(Default)]
struct ConfigStoreInner {
    readers: Vec<ReaderConfig>,
    writers: Vec<WriterConfig>,
    fail_reads: bool,
}

/// In-memory [`ConfigStore`] serving a fixed set of configs.
#[derive(Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<Mutex<ConfigStoreInner>>,
}

impl MemoryConfigStore {
    pub fn new(readers: Vec<ReaderConfig>, writers: Vec<WriterConfig>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConfigStoreInner {
                readers,
                writers,
                fail_reads: false,
            })),
        }
    }

    /// Replaces the served configs, visible from the next refresh.
    pub fn replace(&self, readers: Vec<ReaderConfig>, writers: Vec<WriterConfig>) {
        let mut inner = self.inner.lock().unwrap();
        inner.readers = readers;
        inner.writers = writers;
    }

    /// Makes every subsequent read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().unwrap().fail_reads = fail;
    }
}

impl ConfigStore for MemoryConfigStore {
    async fn reader_configs(&self) -> SyncResult<Vec<ReaderConfig>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_reads {
            bail!(ErrorKind::ConfigStoreFailed, "Config store unavailable");
        }

        Ok(inner.readers.clone())
    }

    async fn writer_configs(&self) -> SyncResult<Vec<WriterConfig>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_reads {
            bail!(ErrorKind::ConfigStoreFailed, "Config store unavailable");
        }

        Ok(inner.writers.clone())
    }
}
