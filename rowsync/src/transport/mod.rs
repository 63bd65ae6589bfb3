//! Order-preserving event transport between pipeline stages.

pub mod base;
pub mod broker;
pub mod local;
pub mod memory;

pub use base::{BrokerClient, SendStatus, Transport};
pub use broker::BrokerTransport;
pub use local::LocalTransport;
pub use memory::MemoryBroker;
