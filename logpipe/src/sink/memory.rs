use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::PipeResult;
use crate::sink::Sink;
use crate::types::LogEvent;

#[derive(Debug, Default)]
struct Inner {
    events: Vec<LogEvent>,
    batches: u64,
}

/// In-memory sink for testing and development purposes.
///
/// All persisted events are kept in memory, in insertion order, and lost when the process
/// terminates. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all events persisted so far.
    pub async fn events(&self) -> Vec<LogEvent> {
        let inner = self.inner.lock().await;
        inner.events.clone()
    }

    /// Returns the number of successful batch inserts.
    pub async fn batches(&self) -> u64 {
        self.inner.lock().await.batches
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.events.clear();
        inner.batches = 0;
    }
}

impl Sink for MemorySink {
    fn name() -> &'static str {
        "memory"
    }

    async fn batch_insert(&self, events: Vec<LogEvent>) -> PipeResult<()> {
        let mut inner = self.inner.lock().await;

        info!("writing a batch of {} log events", events.len());
        for event in &events {
            debug!("  {:?}", event);
        }

        inner.events.extend(events);
        inner.batches += 1;

        Ok(())
    }
}
