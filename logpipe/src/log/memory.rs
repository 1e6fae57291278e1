use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ErrorKind, PipeResult};
use crate::log::LogClient;
use crate::pipe_error;
use crate::types::{RawRecord, RecordId, RecordPayload};

/// Operations of [`LogClient`], used to count calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogOperation {
    EnsureGroup,
    ReadPending,
    ReadNew,
    Acknowledge,
    Append,
    PendingCount,
}

#[derive(Debug)]
struct PendingEntry {
    consumer: String,
    delivery_count: u64,
}

#[derive(Debug)]
struct Group {
    last_delivered: RecordId,
    pending: BTreeMap<RecordId, PendingEntry>,
}

#[derive(Debug, Default)]
struct Stream {
    entries: BTreeMap<RecordId, RecordPayload>,
    last_id: RecordId,
    groups: HashMap<String, Group>,
}

impl Stream {
    fn group_mut(&mut self, stream: &str, group: &str) -> PipeResult<&mut Group> {
        self.groups.get_mut(group).ok_or_else(|| {
            pipe_error!(
                ErrorKind::LogOperationFailed,
                "Consumer group does not exist",
                format!("NOGROUP no consumer group '{group}' for stream '{stream}'")
            )
        })
    }
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<String, Stream>,
    calls: HashMap<LogOperation, u64>,
    injected_failures: HashMap<LogOperation, u64>,
}

impl Inner {
    /// Records a call to `operation` and fails it if failures were injected for it.
    fn enter(&mut self, operation: LogOperation) -> PipeResult<()> {
        *self.calls.entry(operation).or_default() += 1;

        if let Some(remaining) = self.injected_failures.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(pipe_error!(
                    ErrorKind::LogConnectionFailed,
                    "Log connection failed",
                    format!("injected failure for {operation:?}")
                ));
            }
        }

        Ok(())
    }

    fn stream_mut(&mut self, stream: &str) -> PipeResult<&mut Stream> {
        self.streams.get_mut(stream).ok_or_else(|| {
            pipe_error!(
                ErrorKind::LogOperationFailed,
                "Stream does not exist",
                format!("no such key '{stream}'")
            )
        })
    }
}

/// In-process model of a consumer-group based log.
///
/// [`MemoryLog`] reproduces the semantics the consumer relies on: group cursors positioned at
/// the tail on creation, a per-group pending entries list filled by new reads and drained by
/// acknowledgments, and replay of pending entries oldest first. All state is lost when the
/// process terminates, which makes it suited for tests and local development.
///
/// Clones share the same underlying log, so a test can keep a handle while a consumer owns
/// another one.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` calls to `operation` fail with a connection error.
    pub async fn inject_failures(&self, operation: LogOperation, times: u64) {
        let mut inner = self.inner.lock().await;
        inner.injected_failures.insert(operation, times);
    }

    /// Returns how many times `operation` was called.
    pub async fn calls(&self, operation: LogOperation) -> u64 {
        let inner = self.inner.lock().await;
        inner.calls.get(&operation).copied().unwrap_or_default()
    }

    /// Returns all records of `stream` in id order.
    pub async fn entries(&self, stream: &str) -> Vec<RawRecord> {
        let inner = self.inner.lock().await;
        inner
            .streams
            .get(stream)
            .map(|stream| {
                stream
                    .entries
                    .iter()
                    .map(|(id, payload)| RawRecord::new(*id, payload.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the pending record ids of `group`, in id order.
    pub async fn pending_ids(&self, stream: &str, group: &str) -> Vec<RecordId> {
        let inner = self.inner.lock().await;
        inner
            .streams
            .get(stream)
            .and_then(|stream| stream.groups.get(group))
            .map(|group| group.pending.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Returns how many times `record_id` was delivered to `group`, if it is pending.
    pub async fn delivery_count(
        &self,
        stream: &str,
        group: &str,
        record_id: RecordId,
    ) -> Option<u64> {
        let inner = self.inner.lock().await;
        inner
            .streams
            .get(stream)
            .and_then(|stream| stream.groups.get(group))
            .and_then(|group| group.pending.get(&record_id))
            .map(|entry| entry.delivery_count)
    }

    /// Returns the id of the last record delivered to `group`.
    pub async fn last_delivered(&self, stream: &str, group: &str) -> Option<RecordId> {
        let inner = self.inner.lock().await;
        inner
            .streams
            .get(stream)
            .and_then(|stream| stream.groups.get(group))
            .map(|group| group.last_delivered)
    }
}

impl LogClient for MemoryLog {
    fn name() -> &'static str {
        "memory"
    }

    async fn ensure_group(&self, stream: &str, group: &str) -> PipeResult<()> {
        let mut inner = self.inner.lock().await;
        inner.enter(LogOperation::EnsureGroup)?;

        let entry = inner.streams.entry(stream.to_owned()).or_default();
        let tail = entry.last_id;
        if entry.groups.contains_key(group) {
            debug!(stream, group, "consumer group already exists");
            return Ok(());
        }

        entry.groups.insert(
            group.to_owned(),
            Group {
                last_delivered: tail,
                pending: BTreeMap::new(),
            },
        );
        info!(stream, group, %tail, "created consumer group");

        Ok(())
    }

    async fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> PipeResult<Vec<RawRecord>> {
        let mut inner = self.inner.lock().await;
        inner.enter(LogOperation::ReadPending)?;

        let entry = inner.stream_mut(stream)?;
        let Stream {
            entries, groups, ..
        } = entry;
        let group = groups.get_mut(group).ok_or_else(|| {
            pipe_error!(
                ErrorKind::LogOperationFailed,
                "Consumer group does not exist",
                format!("NOGROUP no consumer group '{group}' for stream '{stream}'")
            )
        })?;

        let mut records = Vec::new();
        for (id, pending) in group.pending.iter_mut() {
            if records.len() >= count {
                break;
            }
            if pending.consumer != consumer {
                continue;
            }

            if let Some(payload) = entries.get(id) {
                pending.delivery_count += 1;
                records.push(RawRecord::new(*id, payload.clone()));
            }
        }

        Ok(records)
    }

    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> PipeResult<Vec<RawRecord>> {
        let mut inner = self.inner.lock().await;
        inner.enter(LogOperation::ReadNew)?;

        let stream_name = stream;
        let stream = inner.stream_mut(stream_name)?;
        let records: Vec<RawRecord> = {
            let last_delivered = stream.group_mut(stream_name, group)?.last_delivered;
            stream
                .entries
                .range(last_delivered.next()..)
                .take(count)
                .map(|(id, payload)| RawRecord::new(*id, payload.clone()))
                .collect()
        };

        let group = stream.group_mut(stream_name, group)?;
        for record in &records {
            group.last_delivered = record.id;
            group.pending.insert(
                record.id,
                PendingEntry {
                    consumer: consumer.to_owned(),
                    delivery_count: 1,
                },
            );
        }

        Ok(records)
    }

    async fn acknowledge(&self, stream: &str, group: &str, record_id: RecordId) -> PipeResult<()> {
        let mut inner = self.inner.lock().await;
        inner.enter(LogOperation::Acknowledge)?;

        let stream_name = stream;
        let stream = inner.stream_mut(stream_name)?;
        stream
            .group_mut(stream_name, group)?
            .pending
            .remove(&record_id);

        Ok(())
    }

    async fn append(&self, stream: &str, payload: RecordPayload) -> PipeResult<RecordId> {
        let mut inner = self.inner.lock().await;
        inner.enter(LogOperation::Append)?;

        let stream = inner.streams.entry(stream.to_owned()).or_default();
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        let id = if now > stream.last_id.millis {
            RecordId::new(now, 0)
        } else {
            stream.last_id.next()
        };

        stream.entries.insert(id, payload);
        stream.last_id = id;

        Ok(id)
    }

    async fn pending_count(&self, stream: &str, group: &str) -> PipeResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.enter(LogOperation::PendingCount)?;

        let stream_name = stream;
        let stream = inner.stream_mut(stream_name)?;
        Ok(stream.group_mut(stream_name, group)?.pending.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "logs:stream";
    const GROUP: &str = "log-processors";
    const CONSUMER: &str = "processor-1";

    fn payload(value: &str) -> RecordPayload {
        RecordPayload::with_field("payload", value)
    }

    #[tokio::test]
    async fn group_is_created_at_the_tail() {
        let log = MemoryLog::new();
        log.append(STREAM, payload("before")).await.unwrap();
        log.ensure_group(STREAM, GROUP).await.unwrap();
        let after = log.append(STREAM, payload("after")).await.unwrap();

        let records = log.read_new(STREAM, GROUP, CONSUMER, 10).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, after);
    }

    #[tokio::test]
    async fn ensure_group_is_idempotent_and_keeps_cursor() {
        let log = MemoryLog::new();
        log.ensure_group(STREAM, GROUP).await.unwrap();
        let first = log.append(STREAM, payload("a")).await.unwrap();
        log.read_new(STREAM, GROUP, CONSUMER, 10).await.unwrap();

        log.ensure_group(STREAM, GROUP).await.unwrap();

        assert_eq!(log.last_delivered(STREAM, GROUP).await, Some(first));
        assert_eq!(log.pending_ids(STREAM, GROUP).await, vec![first]);
    }

    #[tokio::test]
    async fn new_reads_become_pending_until_acknowledged() {
        let log = MemoryLog::new();
        log.ensure_group(STREAM, GROUP).await.unwrap();
        let ids = [
            log.append(STREAM, payload("a")).await.unwrap(),
            log.append(STREAM, payload("b")).await.unwrap(),
            log.append(STREAM, payload("c")).await.unwrap(),
        ];

        let records = log.read_new(STREAM, GROUP, CONSUMER, 2).await.unwrap();
        assert_eq!(
            records.iter().map(|r| r.id).collect::<Vec<_>>(),
            ids[..2].to_vec()
        );
        assert_eq!(log.pending_count(STREAM, GROUP).await.unwrap(), 2);

        log.acknowledge(STREAM, GROUP, ids[0]).await.unwrap();
        log.acknowledge(STREAM, GROUP, ids[0]).await.unwrap();
        assert_eq!(log.pending_ids(STREAM, GROUP).await, vec![ids[1]]);

        let pending = log.read_pending(STREAM, GROUP, CONSUMER, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload.get("payload"), Some(&b"b"[..]));
        assert_eq!(log.delivery_count(STREAM, GROUP, ids[1]).await, Some(2));

        let records = log.read_new(STREAM, GROUP, CONSUMER, 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, ids[2]);
    }

    #[tokio::test]
    async fn pending_reads_are_scoped_to_the_consumer() {
        let log = MemoryLog::new();
        log.ensure_group(STREAM, GROUP).await.unwrap();
        log.append(STREAM, payload("a")).await.unwrap();
        log.read_new(STREAM, GROUP, "other", 10).await.unwrap();

        let pending = log.read_pending(STREAM, GROUP, CONSUMER, 10).await.unwrap();

        assert!(pending.is_empty());
        assert_eq!(log.pending_count(STREAM, GROUP).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn appended_ids_are_strictly_increasing() {
        let log = MemoryLog::new();
        let mut previous = RecordId::MIN;
        for _ in 0..100 {
            let id = log.append(STREAM, payload("x")).await.unwrap();
            assert!(id > previous);
            previous = id;
        }
    }

    #[tokio::test]
    async fn reading_without_group_fails() {
        let log = MemoryLog::new();
        log.append(STREAM, payload("a")).await.unwrap();

        let err = log.read_new(STREAM, GROUP, CONSUMER, 10).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::LogOperationFailed);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let log = MemoryLog::new();
        log.inject_failures(LogOperation::EnsureGroup, 1).await;

        let err = log.ensure_group(STREAM, GROUP).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LogConnectionFailed);

        log.ensure_group(STREAM, GROUP).await.unwrap();
        assert_eq!(log.calls(LogOperation::EnsureGroup).await, 2);
    }
}
