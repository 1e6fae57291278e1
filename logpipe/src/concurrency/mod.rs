//! Concurrency primitives of the consumer pipeline.
//!
//! [`shutdown`] broadcasts a stop request to running workers, which observe it between ticks
//! so that a batch being persisted always completes its acknowledgment procedure.
//! [`backpressure`] bounds the number of records that are read but not yet released.

pub mod backpressure;
pub mod shutdown;
