use std::future::pending;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{ErrorKind, PipeResult};
use crate::pipe_error;
use crate::sink::Sink;
use crate::sink::memory::MemorySink;
use crate::types::LogEvent;

/// Scripted behavior of a [`FaultInjectingSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFault {
    /// Every write succeeds.
    None,
    /// The next `n` writes fail, later ones succeed.
    FailTimes(u64),
    /// Every write fails.
    FailAlways,
    /// Every write waits forever without completing.
    BlockForever,
}

#[derive(Debug)]
struct Inner {
    fault: SinkFault,
    attempts: u64,
    failures: u64,
}

/// Sink that fails or blocks according to a [`SinkFault`] and stores successful writes in a
/// [`MemorySink`].
///
/// Clones share the same script and storage.
#[derive(Debug, Clone)]
pub struct FaultInjectingSink {
    inner: Arc<Mutex<Inner>>,
    memory: MemorySink,
}

impl FaultInjectingSink {
    pub fn new(fault: SinkFault) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                fault,
                attempts: 0,
                failures: 0,
            })),
            memory: MemorySink::new(),
        }
    }

    pub fn fail_times(n: u64) -> Self {
        Self::new(SinkFault::FailTimes(n))
    }

    pub fn fail_always() -> Self {
        Self::new(SinkFault::FailAlways)
    }

    pub fn block_forever() -> Self {
        Self::new(SinkFault::BlockForever)
    }

    /// Replaces the script, e.g. to let a failing sink recover.
    pub async fn set_fault(&self, fault: SinkFault) {
        self.inner.lock().await.fault = fault;
    }

    /// Number of calls to [`Sink::batch_insert`], whatever their outcome.
    pub async fn attempts(&self) -> u64 {
        self.inner.lock().await.attempts
    }

    /// Number of writes that failed.
    pub async fn failures(&self) -> u64 {
        self.inner.lock().await.failures
    }

    /// Events written successfully.
    pub async fn events(&self) -> Vec<LogEvent> {
        self.memory.events().await
    }
}

impl Sink for FaultInjectingSink {
    fn name() -> &'static str {
        "fault_injecting"
    }

    async fn batch_insert(&self, events: Vec<LogEvent>) -> PipeResult<()> {
        let fail = {
            let mut inner = self.inner.lock().await;
            inner.attempts += 1;

            let fault = inner.fault;
            match fault {
                SinkFault::None => false,
                SinkFault::FailTimes(0) => {
                    inner.fault = SinkFault::None;
                    false
                }
                SinkFault::FailTimes(n) => {
                    inner.fault = SinkFault::FailTimes(n - 1);
                    true
                }
                SinkFault::FailAlways => true,
                SinkFault::BlockForever => {
                    drop(inner);
                    info!("blocking a batch of {} log events forever", events.len());
                    return pending().await;
                }
            }
        };

        if fail {
            self.inner.lock().await.failures += 1;
            return Err(pipe_error!(
                ErrorKind::SinkQueryFailed,
                "Sink write failed",
                "injected failure"
            ));
        }

        self.memory.batch_insert(events).await
    }
}
