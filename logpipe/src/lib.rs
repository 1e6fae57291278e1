//! Consumer-side log pipeline.
//!
//! Reads structured log events from a durable, consumer-group based log, persists them in
//! batches to a relational sink and acknowledges them only after the write succeeded. Records
//! that were delivered but never acknowledged are replayed before any new record is polled, and
//! a backpressure gate bounds how many records are in flight at once.

pub mod codec;
pub mod concurrency;
pub mod consumer;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod log;
mod macros;
pub mod metrics;
pub mod sink;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
