use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for the broker-backed ordered transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransportConfig {
    /// Topic the change events are published to.
    pub topic: String,
    /// Capacity of the local queue buffering events whose asynchronous send
    /// failed. Once full, further failures are logged and dropped.
    #[serde(default = "default_retry_queue_capacity")]
    pub retry_queue_capacity: usize,
    /// Number of synchronous attempts the retry loop makes per event before
    /// declaring it undeliverable.
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,
}

impl TransportConfig {
    /// Default retry queue capacity.
    pub const DEFAULT_RETRY_QUEUE_CAPACITY: usize = 10000;

    /// Default number of synchronous send attempts.
    pub const DEFAULT_MAX_SEND_ATTEMPTS: u32 = 3;

    /// Validates transport settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.topic.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "transport.topic",
                constraint: "must not be empty",
            });
        }

        if self.retry_queue_capacity == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "transport.retry_queue_capacity",
                constraint: "must be greater than 0",
            });
        }

        if self.max_send_attempts == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "transport.max_send_attempts",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

fn default_retry_queue_capacity() -> usize {
    TransportConfig::DEFAULT_RETRY_QUEUE_CAPACITY
}

fn default_max_send_attempts() -> u32 {
    TransportConfig::DEFAULT_MAX_SEND_ATTEMPTS
}
