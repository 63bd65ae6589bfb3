//! Concurrency primitives shared by pipeline components.

pub mod shutdown;
