use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use crate::error::PipeResult;
use crate::sink::Sink;
use crate::test_utils::notify::TimedNotify;
use crate::types::LogEvent;

type RowCondition = Box<dyn Fn(&[LogEvent]) -> bool + Send + Sync>;

struct Inner {
    events: Vec<LogEvent>,
    conditions: Vec<(RowCondition, Arc<Notify>)>,
    batch_insert_calls: u64,
}

impl Inner {
    fn check_conditions(&mut self) {
        let events = &self.events;
        self.conditions.retain(|(condition, notify)| {
            let should_retain = !condition(events);
            if !should_retain {
                notify.notify_one();
            }
            should_retain
        });
    }
}

/// Wrapper around a [`Sink`] that records every successfully written event.
///
/// Tests register conditions on the written rows and await them through a [`TimedNotify`],
/// which lets them observe a background consumer without sleeping.
pub struct TestSinkWrapper<S> {
    wrapped_sink: Arc<S>,
    inner: Arc<Mutex<Inner>>,
}

impl<S> Clone for TestSinkWrapper<S> {
    fn clone(&self) -> Self {
        Self {
            wrapped_sink: self.wrapped_sink.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<S> TestSinkWrapper<S> {
    pub fn wrap(sink: S) -> Self {
        let inner = Inner {
            events: Vec::new(),
            conditions: Vec::new(),
            batch_insert_calls: 0,
        };

        Self {
            wrapped_sink: Arc::new(sink),
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Returns all events written through the wrapper.
    pub async fn events(&self) -> Vec<LogEvent> {
        self.inner.lock().await.events.clone()
    }

    pub async fn batch_insert_calls(&self) -> u64 {
        self.inner.lock().await.batch_insert_calls
    }

    /// Registers a notification fired once `condition` holds for the written events.
    pub async fn notify_on_rows<F>(&self, condition: F) -> TimedNotify
    where
        F: Fn(&[LogEvent]) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().await;
        inner.conditions.push((Box::new(condition), notify.clone()));

        // The condition may already hold.
        inner.check_conditions();

        TimedNotify::new(notify)
    }

    /// Registers a notification fired once at least `rows` events were written.
    pub async fn wait_for_rows(&self, rows: usize) -> TimedNotify {
        self.notify_on_rows(move |events| events.len() >= rows).await
    }
}

impl<S> Sink for TestSinkWrapper<S>
where
    S: Sink + Send + Sync,
{
    fn name() -> &'static str {
        S::name()
    }

    async fn shutdown(&self) -> PipeResult<()> {
        self.wrapped_sink.shutdown().await
    }

    async fn batch_insert(&self, events: Vec<LogEvent>) -> PipeResult<()> {
        self.inner.lock().await.batch_insert_calls += 1;

        // The lock is not held during the write so a blocked sink does not block inspection.
        let result = self.wrapped_sink.batch_insert(events.clone()).await;
        if result.is_ok() {
            let mut inner = self.inner.lock().await;
            inner.events.extend(events);
            inner.check_conditions();
        }

        result
    }
}
