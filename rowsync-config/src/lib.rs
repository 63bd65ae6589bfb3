//! Configuration types and loading for rowsync pipelines.

mod environment;
mod load;
pub mod shared;

pub use environment::{Environment, UnknownEnvironment};
pub use load::{LoadConfigError, load_config};
