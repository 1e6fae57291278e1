//! Relational sinks receiving decoded log events in batches.

mod base;
pub mod memory;
pub mod postgres;

pub use base::Sink;
