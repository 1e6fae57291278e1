use std::future::Future;

use crate::error::PipeResult;
use crate::types::LogEvent;

/// Trait for stores that persist decoded log events.
///
/// [`Sink::batch_insert`] is all-or-nothing: when it returns an error none of the events may be
/// visible in the store, so that the consumer can leave the whole batch pending and retry it.
/// A batch can be delivered more than once after a crash, implementations must tolerate
/// duplicates.
pub trait Sink {
    /// Returns the name of the sink.
    fn name() -> &'static str;

    /// Releases resources held by the sink. The default implementation is a no-op.
    fn shutdown(&self) -> impl Future<Output = PipeResult<()>> + Send {
        async { Ok(()) }
    }

    /// Persists all `events` atomically.
    fn batch_insert(&self, events: Vec<LogEvent>) -> impl Future<Output = PipeResult<()>> + Send;
}
