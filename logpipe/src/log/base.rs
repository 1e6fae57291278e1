use std::future::Future;

use crate::error::PipeResult;
use crate::types::{RawRecord, RecordId, RecordPayload};

/// Consumer-group primitives of a durable, ordered, replayable log.
///
/// [`LogClient`] implementations only expose the contract of the log; the cursor of a group and
/// its pending entries list are owned by the log itself. A record read through
/// [`LogClient::read_new`] becomes pending for the reading consumer until it is acknowledged.
///
/// Network or server failures are returned as retryable errors of kind
/// [`crate::error::ErrorKind::LogConnectionFailed`] or
/// [`crate::error::ErrorKind::LogOperationFailed`].
pub trait LogClient {
    /// Returns the name of the log implementation.
    fn name() -> &'static str;

    /// Creates `group` on `stream`, positioned at the current tail.
    ///
    /// Creates the stream when it does not exist. A group that already exists is not an error
    /// and its cursor is left untouched.
    fn ensure_group(
        &self,
        stream: &str,
        group: &str,
    ) -> impl Future<Output = PipeResult<()>> + Send;

    /// Returns up to `count` records that were delivered to `consumer` but never acknowledged,
    /// oldest first.
    fn read_pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> impl Future<Output = PipeResult<Vec<RawRecord>>> + Send;

    /// Returns up to `count` records never delivered to any consumer of `group`, advancing the
    /// group cursor past them. Each returned record becomes pending for `consumer`.
    fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> impl Future<Output = PipeResult<Vec<RawRecord>>> + Send;

    /// Removes `record_id` from the pending entries of `group`.
    ///
    /// Acknowledging an id that is not pending is a no-op.
    fn acknowledge(
        &self,
        stream: &str,
        group: &str,
        record_id: RecordId,
    ) -> impl Future<Output = PipeResult<()>> + Send;

    /// Appends a record with an auto-generated id and returns that id.
    fn append(
        &self,
        stream: &str,
        payload: RecordPayload,
    ) -> impl Future<Output = PipeResult<RecordId>> + Send;

    /// Returns the total number of pending entries of `group`, across all its consumers.
    fn pending_count(
        &self,
        stream: &str,
        group: &str,
    ) -> impl Future<Output = PipeResult<u64>> + Send;
}
