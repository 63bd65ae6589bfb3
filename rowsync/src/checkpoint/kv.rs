use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::SyncResult;

/// External key-value store holding checkpoint state, with a named
/// distributed lock per key.
///
/// `acquire_lock` blocks until the lock is held; implementations are
/// expected to put their own bound on how long that can take.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = SyncResult<Option<String>>> + Send;

    fn set(&self, key: &str, value: &str) -> impl Future<Output = SyncResult<()>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = SyncResult<()>> + Send;

    fn acquire_lock(&self, key: &str) -> impl Future<Output = SyncResult<()>> + Send;

    fn release_lock(&self, key: &str) -> impl Future<Output = SyncResult<()>> + Send;
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, String>,
    locks: HashSet<String>,
}

/// In-process [`KvStore`] used by tests and local runs.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored entry, for assertions.
    pub fn entries(&self) -> HashMap<String, String> {
        self.inner.lock().unwrap().entries.clone()
    }
}

impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.inner.lock().unwrap().entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .insert(key.to_string(), value.to_string());

        Ok(())
    }

    async fn delete(&self, key: &str) -> SyncResult<()> {
        self.inner.lock().unwrap().entries.remove(key);

        Ok(())
    }

    async fn acquire_lock(&self, key: &str) -> SyncResult<()> {
        loop {
            if self.inner.lock().unwrap().locks.insert(key.to_string()) {
                return Ok(());
            }

            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn release_lock(&self, key: &str) -> SyncResult<()> {
        self.inner.lock().unwrap().locks.remove(key);

        Ok(())
    }
}
