//! Utilities for testing the consumer and its collaborators without external services.
//!
//! - [`event`] builds log events and raw records.
//! - [`fault_sink`] provides a [`crate::sink::Sink`] with scripted failures.
//! - [`test_sink_wrapper`] records writes and lets tests wait for a row count.
//! - [`notify`] wraps [`tokio::sync::Notify`] with a timeout so tests fail instead of hanging.
//! - [`init_test_tracing`] installs a subscriber when `ENABLE_TRACING` is set.

pub mod event;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod fault_sink;
pub mod notify;
pub mod test_sink_wrapper;

pub use logpipe_telemetry::tracing::init_test_tracing;
