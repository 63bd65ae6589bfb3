//! Telemetry initialization for rowsync services and tests.

pub mod tracing;
