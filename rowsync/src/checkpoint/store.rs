use chrono::NaiveDateTime;
use rowsync_config::shared::{CheckpointConfig, GroupConfig};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::bail;
use crate::checkpoint::kv::KvStore;
use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;

/// Format accepted by [`CheckpointStore::reset_at`].
const RESET_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Outcome of a checkpoint save.
///
/// `Reset` means the position was rewound externally while this consumer was
/// running: the save was deliberately not persisted and the caller must
/// terminate its capture loop so the supervisor restarts it from the reset
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Reset,
}

/// Persists and rewinds per-group stream positions in an external KV store.
///
/// Saves and resets for one group serialize on the group's named lock, so a
/// reset never interleaves with an in-flight save. The stored position is an
/// opaque JSON document whose top-level `timestamp` field (unix seconds) is
/// the only part this store interprets.
pub struct CheckpointStore<K> {
    kv: K,
    key_prefix: String,
    initial_checkpoints: HashMap<String, i64>,
}

impl<K> CheckpointStore<K>
where
    K: KvStore,
{
    /// Creates a store over `kv` for the configured consumer groups.
    pub fn new(kv: K, config: &CheckpointConfig, groups: &[GroupConfig]) -> Self {
        Self {
            kv,
            key_prefix: config.key_prefix.clone(),
            initial_checkpoints: groups
                .iter()
                .map(|group| (group.group_id.clone(), group.initial_checkpoint))
                .collect(),
        }
    }

    fn position_key(&self, group_id: &str) -> String {
        format!("{}{group_id}", self.key_prefix)
    }

    fn reset_key(&self, group_id: &str) -> String {
        format!("{}reset:{group_id}", self.key_prefix)
    }

    fn lock_key(&self, group_id: &str) -> String {
        format!("{}lock:{group_id}", self.key_prefix)
    }

    /// Loads the stored position for a group.
    pub async fn load(&self, group_id: &str) -> SyncResult<Option<String>> {
        self.kv.get(&self.position_key(group_id)).await
    }

    /// Persists the position unless the group was externally reset.
    ///
    /// When the reset flag is found it is cleared and [`SaveOutcome::Reset`]
    /// is returned without persisting, so the externally written position is
    /// not overwritten by a stale in-flight one.
    pub async fn save(&self, group_id: &str, position: &str) -> SyncResult<SaveOutcome> {
        let lock_key = self.lock_key(group_id);
        self.kv.acquire_lock(&lock_key).await?;
        let result = self.save_locked(group_id, position).await;
        self.kv.release_lock(&lock_key).await?;

        result
    }

    async fn save_locked(&self, group_id: &str, position: &str) -> SyncResult<SaveOutcome> {
        if self.kv.get(&self.reset_key(group_id)).await?.is_some() {
            self.kv.delete(&self.reset_key(group_id)).await?;
            info!(group_id, "position was externally reset, discarding save");

            return Ok(SaveOutcome::Reset);
        }

        self.kv.set(&self.position_key(group_id), position).await?;
        debug!(group_id, "checkpoint saved");

        Ok(SaveOutcome::Saved)
    }

    /// Rewinds a group's position to `unix_secs` and flags the group reset.
    ///
    /// The only sanctioned way to rewind consumption: the timestamp must not
    /// be earlier than the group's configured initial checkpoint, and the
    /// rewrite happens under the same lock the saves take.
    pub async fn reset(&self, group_id: &str, unix_secs: i64) -> SyncResult<()> {
        let Some(&initial) = self.initial_checkpoints.get(group_id) else {
            bail!(
                ErrorKind::InvalidConfig,
                "Unknown consumer group",
                format!("No configured group '{group_id}'")
            );
        };

        if unix_secs < initial {
            bail!(
                ErrorKind::CheckpointResetRejected,
                "Reset timestamp predates the stream's initial checkpoint",
                format!("Requested {unix_secs}, initial checkpoint {initial}")
            );
        }

        let lock_key = self.lock_key(group_id);
        self.kv.acquire_lock(&lock_key).await?;
        let result = self.reset_locked(group_id, unix_secs).await;
        self.kv.release_lock(&lock_key).await?;

        result
    }

    async fn reset_locked(&self, group_id: &str, unix_secs: i64) -> SyncResult<()> {
        let position_key = self.position_key(group_id);

        let mut position = match self.kv.get(&position_key).await? {
            Some(stored) => match serde_json::from_str::<Value>(&stored) {
                Ok(Value::Object(object)) => Value::Object(object),
                Ok(_) | Err(_) => {
                    warn!(group_id, "stored position is not a JSON object, replacing");
                    json!({})
                }
            },
            None => json!({}),
        };

        position["timestamp"] = json!(unix_secs);
        let serialized = serde_json::to_string(&position)?;

        self.kv.set(&position_key, &serialized).await?;
        self.kv.set(&self.reset_key(group_id), "1").await?;

        info!(group_id, timestamp = unix_secs, "checkpoint reset");

        Ok(())
    }

    /// Rewinds a group's position to a `yyyyMMddHHmmss` formatted UTC time.
    pub async fn reset_at(&self, group_id: &str, formatted: &str) -> SyncResult<()> {
        let datetime = NaiveDateTime::parse_from_str(formatted, RESET_DATE_FORMAT).map_err(|err| {
            sync_error!(
                ErrorKind::ConversionError,
                "Invalid reset timestamp format",
                format!("Expected yyyyMMddHHmmss, got '{formatted}'"),
                source: err
            )
        })?;

        self.reset(group_id, datetime.and_utc().timestamp()).await
    }
}
