pub mod capture;
pub mod checkpoint;
pub mod concurrency;
pub mod conversions;
pub mod error;
pub mod macros;
pub mod pipeline;
pub mod reconcile;
pub mod router;
pub mod transport;
pub mod types;
pub mod workers;
