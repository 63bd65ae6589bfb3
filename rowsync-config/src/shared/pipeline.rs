use serde::{Deserialize, Serialize};

use crate::shared::{ValidationError, WorkerPoolConfig};

/// Configuration for the consume side of a rowsync pipeline.
///
/// Covers the worker pool that serializes per-key processing and the
/// periodic refresh of the sync config snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// The unique identifier for this pipeline.
    pub id: u64,
    /// Worker pool configuration.
    #[serde(default)]
    pub pool: WorkerPoolConfig,
    /// Sync config refresh configuration.
    #[serde(default)]
    pub refresh: ConfigRefreshConfig,
}

impl PipelineConfig {
    /// Validates pipeline configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pool.validate()?;
        self.refresh.validate()?;

        Ok(())
    }
}

/// Configuration for the periodic sync-config snapshot refresh.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConfigRefreshConfig {
    /// Seconds between snapshot refreshes from the config store.
    #[serde(default = "default_refresh_interval_secs")]
    pub interval_secs: u64,
}

impl ConfigRefreshConfig {
    /// Default refresh interval in seconds.
    pub const DEFAULT_INTERVAL_SECS: u64 = 60;

    /// Validates refresh settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_secs == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "refresh.interval_secs",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for ConfigRefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval_secs(),
        }
    }
}

fn default_refresh_interval_secs() -> u64 {
    ConfigRefreshConfig::DEFAULT_INTERVAL_SECS
}
