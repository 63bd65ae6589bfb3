//! Source-stream capture: record typing, event construction, supervision.

pub mod record;
pub mod supervisor;

pub use record::{RecordHandler, SourceColumn, SourceOp, SourceRecord, build_event};
pub use supervisor::{CaptureClient, CaptureClientFactory, CaptureSupervisor};
