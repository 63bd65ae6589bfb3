use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for the capture side of a pipeline.
///
/// This intentionally does not implement [`Serialize`] to avoid accidentally
/// leaking group credentials into serialized forms.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CaptureConfig {
    /// One entry per source consumer group the supervisor runs.
    pub groups: Vec<GroupConfig>,
    /// Seconds between supervisor liveness checks of the capture workers.
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

impl CaptureConfig {
    /// Default supervisor health check interval in seconds.
    pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 10;

    /// Validates capture settings and every configured group.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.groups.is_empty() {
            return Err(ValidationError::NoCaptureGroups);
        }

        for group in &self.groups {
            group.validate()?;
        }

        Ok(())
    }
}

/// One source consumer group: credentials, stream address, and the earliest
/// position consumption may be rewound to.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GroupConfig {
    /// Consumer group identifier; also keys the checkpoint records.
    pub group_id: String,
    /// Address of the capture stream broker.
    pub broker_url: String,
    /// Topic of the capture stream.
    pub topic: String,
    /// Username for the capture stream, if the source requires auth.
    #[serde(default)]
    pub username: Option<String>,
    /// Password for the capture stream, if the source requires auth.
    #[serde(default)]
    pub password: Option<SecretString>,
    /// Initial checkpoint as unix seconds; the first position consumed when
    /// no stored checkpoint exists, and the lower bound for resets.
    pub initial_checkpoint: i64,
    /// Forces consumption to start from `initial_checkpoint` even when a
    /// stored checkpoint exists.
    #[serde(default)]
    pub force_use_checkpoint: bool,
}

impl GroupConfig {
    /// Validates a single group entry.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.group_id.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "capture.groups.group_id",
                constraint: "must not be empty",
            });
        }

        if self.initial_checkpoint < 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "capture.groups.initial_checkpoint",
                constraint: "must not be negative",
            });
        }

        Ok(())
    }
}

/// Configuration for the checkpoint store key layout.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CheckpointConfig {
    /// Prefix under which checkpoint, reset flag, and lock keys are stored.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl CheckpointConfig {
    /// Default key prefix for checkpoint records.
    pub const DEFAULT_KEY_PREFIX: &'static str = "sync:checkpoint:";
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_health_check_interval_secs() -> u64 {
    CaptureConfig::DEFAULT_HEALTH_CHECK_INTERVAL_SECS
}

fn default_key_prefix() -> String {
    CheckpointConfig::DEFAULT_KEY_PREFIX.to_string()
}
