use std::future::Future;

use crate::error::PipeResult;

/// Trait for background workers of the pipeline.
///
/// Starting a worker spawns its processing loop and returns a handle used to observe its state
/// and wait for its completion.
///
/// The generic parameter `H` is the handle type returned on start and `S` the state type
/// exposed through that handle.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Error type returned when worker startup fails.
    type Error;

    /// Starts the worker and returns a handle for monitoring its execution.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// Handle for monitoring and waiting on a running worker.
///
/// The handle stays valid after the worker completed, so its last state can still be read.
pub trait WorkerHandle<S> {
    /// Returns a snapshot of the worker's current state.
    fn state(&self) -> S;

    /// Waits for the worker to complete and returns its final result.
    fn wait(self) -> impl Future<Output = PipeResult<()>> + Send;
}
