use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::error::SyncResult;
use crate::reconcile::base::ConfigStore;
use crate::reconcile::config::{ReaderConfig, WriterConfig};

/// A validated reader/writer config pair sharing a correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigPair {
    pub reader: ReaderConfig,
    pub writer: WriterConfig,
}

/// Immutable view of all config pairs, keyed by `db.table`.
///
/// Built once per refresh and shared behind an `Arc`; readers never observe
/// a partially updated mapping.
#[derive(Debug, Default)]
pub struct ConfigSnapshot {
    pairs: HashMap<String, Vec<ConfigPair>>,
    len: usize,
}

impl ConfigSnapshot {
    /// Pairs reader and writer configs by shared id and validates each pair.
    ///
    /// Unmatched halves are logged and dropped, as are pairs whose role
    /// flags would make the update and delete paths re-route into each other
    /// forever: a soft-delete key with `del_whole_data` set on the reader but
    /// not on the writer sends UPDATEs to the delete path and DELETEs back to
    /// the update path.
    pub fn build(readers: Vec<ReaderConfig>, writers: Vec<WriterConfig>) -> Self {
        let mut writers_by_id: HashMap<u64, WriterConfig> = writers
            .into_iter()
            .map(|writer| (writer.flags.id, writer))
            .collect();

        let mut pairs: HashMap<String, Vec<ConfigPair>> = HashMap::new();
        let mut len = 0;

        for reader in readers {
            let Some(writer) = writers_by_id.remove(&reader.flags.id) else {
                warn!(
                    id = reader.flags.id,
                    table = %reader.flags.table_key(),
                    "reader config has no writer counterpart, dropping"
                );
                continue;
            };

            if is_circular(&reader, &writer) {
                warn!(
                    id = reader.flags.id,
                    table = %reader.flags.table_key(),
                    "update and delete paths re-route into each other, dropping pair"
                );
                continue;
            }

            let key = reader.flags.table_key();
            pairs.entry(key).or_default().push(ConfigPair { reader, writer });
            len += 1;
        }

        for writer in writers_by_id.into_values() {
            warn!(
                id = writer.flags.id,
                table = %writer.flags.table_key(),
                "writer config has no reader counterpart, dropping"
            );
        }

        Self { pairs, len }
    }

    /// Returns the config pairs for a `db.table` key, empty when none match.
    pub fn pairs_for(&self, table_key: &str) -> &[ConfigPair] {
        self.pairs.get(table_key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns every `db.table` key with at least one pair.
    pub fn table_keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.keys().map(String::as_str)
    }

    /// Number of valid pairs in the snapshot.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the snapshot holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn is_circular(reader: &ReaderConfig, writer: &WriterConfig) -> bool {
    reader.flags.del_key_name.is_some()
        && reader.flags.del_whole_data
        && !writer.flags.del_whole_data
}

/// Atomically swapped holder of the current [`ConfigSnapshot`].
///
/// Readers clone the `Arc` and keep using a consistent snapshot for the
/// duration of one event; the refresher replaces the `Arc` wholesale.
pub struct ConfigCache {
    snapshot: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigCache {
    /// Loads the initial snapshot from the store.
    ///
    /// Unlike a periodic refresh, the initial load is fail-fast: without a
    /// first snapshot the pipeline has nothing to route on.
    pub async fn load<S: ConfigStore>(store: &S) -> SyncResult<Self> {
        let readers = store.reader_configs().await?;
        let writers = store.writer_configs().await?;
        let snapshot = ConfigSnapshot::build(readers, writers);

        info!(pairs = snapshot.len(), "loaded initial config snapshot");

        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Returns the current snapshot.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.read().unwrap().clone()
    }

    /// Rebuilds the snapshot from the store and swaps it in.
    pub async fn refresh<S: ConfigStore>(&self, store: &S) -> SyncResult<()> {
        let readers = store.reader_configs().await?;
        let writers = store.writer_configs().await?;
        let snapshot = ConfigSnapshot::build(readers, writers);

        debug!(pairs = snapshot.len(), "refreshed config snapshot");
        *self.snapshot.write().unwrap() = Arc::new(snapshot);

        Ok(())
    }

    /// Spawns the periodic refresh task.
    ///
    /// A refresh failure keeps the previous snapshot and logs a warning; a
    /// briefly unavailable config store must not take the pipeline down.
    pub fn spawn_refresher<S>(
        self: &Arc<Self>,
        store: Arc<S>,
        interval: Duration,
        mut shutdown_rx: ShutdownRx,
    ) -> JoinHandle<()>
    where
        S: ConfigStore + 'static,
    {
        let cache = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; the initial load already
            // happened, so skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!("config refresher shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(err) = cache.refresh(store.as_ref()).await {
                            warn!(error = %err, "config refresh failed, keeping previous snapshot");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::config::SyncFlags;

    fn reader(id: u64, table: &str) -> ReaderConfig {
        ReaderConfig {
            flags: SyncFlags {
                id,
                db: "shop".to_string(),
                table: table.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn writer(id: u64, table: &str) -> WriterConfig {
        WriterConfig {
            flags: SyncFlags {
                id,
                db: "shop".to_string(),
                table: table.to_string(),
                ..Default::default()
            },
            index: format!("idx_{table}"),
            ..Default::default()
        }
    }

    #[test]
    fn pairs_configs_by_shared_id() {
        let snapshot = ConfigSnapshot::build(
            vec![reader(1, "orders"), reader(2, "items")],
            vec![writer(2, "items"), writer(1, "orders")],
        );

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.pairs_for("shop.orders").len(), 1);
        assert_eq!(snapshot.pairs_for("shop.items").len(), 1);
        assert!(snapshot.pairs_for("shop.unknown").is_empty());
    }

    #[test]
    fn drops_unmatched_halves() {
        let snapshot =
            ConfigSnapshot::build(vec![reader(1, "orders")], vec![writer(2, "items")]);

        assert!(snapshot.is_empty());
    }

    #[test]
    fn drops_circular_reroute_pair() {
        let mut r = reader(1, "orders");
        r.flags.del_key_name = Some("status".to_string());
        r.flags.has_del_val = Some("DELETED".to_string());
        r.flags.del_whole_data = true;

        let mut w = writer(1, "orders");
        w.flags.del_whole_data = false;

        let snapshot = ConfigSnapshot::build(vec![r], vec![w]);

        assert!(snapshot.is_empty());
    }

    #[test]
    fn keeps_consistent_soft_delete_pair() {
        let mut r = reader(1, "orders");
        r.flags.del_key_name = Some("status".to_string());
        r.flags.has_del_val = Some("DELETED".to_string());
        r.flags.del_whole_data = true;

        let mut w = writer(1, "orders");
        w.flags.del_whole_data = true;

        let snapshot = ConfigSnapshot::build(vec![r], vec![w]);

        assert_eq!(snapshot.len(), 1);
    }
}
