//! The consumer pipeline: batch assembly and the tick-driven consumer loop.

pub mod batch;
pub mod worker;

pub use batch::{AssembledBatch, BatchAssembler};
pub use worker::{BatchOutcome, ConsumerState, ConsumerWorkerHandle, LogConsumer, TickOutcome};
