//! Clients for the durable, consumer-group based log.

mod base;
pub mod memory;
pub mod redis;

pub use base::LogClient;
