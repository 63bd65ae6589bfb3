//! Shared configuration types for rowsync pipelines.

mod capture;
mod pipeline;
mod pool;
mod transport;

pub use capture::{CaptureConfig, CheckpointConfig, GroupConfig};
pub use pipeline::{ConfigRefreshConfig, PipelineConfig};
pub use pool::WorkerPoolConfig;
pub use transport::TransportConfig;

use thiserror::Error;

/// Errors produced when validating configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A field holds a value outside its allowed range or form.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue {
        field: &'static str,
        constraint: &'static str,
    },

    /// No capture groups are configured.
    #[error("at least one capture group must be configured")]
    NoCaptureGroups,
}
