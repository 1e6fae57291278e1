use metrics::counter;
use std::sync::Arc;
use tracing::warn;

use crate::codec::decode;
use crate::metrics::{CONSUMER_GROUP_LABEL, LOGPIPE_DECODE_FAILURES_TOTAL, STREAM_LABEL};
use crate::types::{LogEvent, RawRecord, RecordId};

/// Events decoded from one read of the log, ready to be persisted.
///
/// `events[i]` was decoded from the record `record_ids[i]`. Records that failed to decode are
/// listed in `failed_record_ids` and have no event.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AssembledBatch {
    pub events: Vec<LogEvent>,
    pub record_ids: Vec<RecordId>,
    pub failed_record_ids: Vec<RecordId>,
}

impl AssembledBatch {
    /// Returns `true` if no record could be decoded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Decodes raw records into an [`AssembledBatch`].
///
/// Each record decodes independently: a malformed record is logged, counted and excluded while
/// the rest of the batch is kept.
#[derive(Debug, Clone)]
pub struct BatchAssembler {
    stream: Arc<str>,
    group: Arc<str>,
}

impl BatchAssembler {
    pub fn new(stream: &str, group: &str) -> Self {
        Self {
            stream: Arc::from(stream),
            group: Arc::from(group),
        }
    }

    pub fn assemble(&self, records: &[RawRecord]) -> AssembledBatch {
        let mut batch = AssembledBatch {
            events: Vec::with_capacity(records.len()),
            record_ids: Vec::with_capacity(records.len()),
            failed_record_ids: Vec::new(),
        };

        for record in records {
            match decode(record) {
                Ok(event) => {
                    batch.events.push(event);
                    batch.record_ids.push(record.id);
                }
                Err(err) => {
                    warn!(
                        stream = %self.stream,
                        record_id = %record.id,
                        error = %err,
                        "skipping record that failed to decode, it stays pending"
                    );
                    batch.failed_record_ids.push(record.id);
                }
            }
        }

        if !batch.failed_record_ids.is_empty() {
            counter!(
                LOGPIPE_DECODE_FAILURES_TOTAL,
                STREAM_LABEL => self.stream.to_string(),
                CONSUMER_GROUP_LABEL => self.group.to_string()
            )
            .increment(batch.failed_record_ids.len() as u64);
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::encode;
    use crate::test_utils::event::{create_log_event, create_raw_record};

    use super::*;

    #[test]
    fn malformed_records_are_isolated() {
        let records: Vec<RawRecord> = (1..=10)
            .map(|i| {
                if i == 5 {
                    create_raw_record(RecordId::new(i, 0), "not-json")
                } else {
                    RawRecord::new(RecordId::new(i, 0), encode(&create_log_event(i)))
                }
            })
            .collect();

        let batch = BatchAssembler::new("logs:stream", "log-processors").assemble(&records);

        assert_eq!(batch.events.len(), 9);
        assert_eq!(batch.record_ids.len(), 9);
        assert!(!batch.record_ids.contains(&RecordId::new(5, 0)));
        assert_eq!(batch.failed_record_ids, vec![RecordId::new(5, 0)]);
        assert_eq!(batch.events[4].message, "message 6");
    }

    #[test]
    fn record_that_is_not_utf8_is_isolated() {
        let records = vec![
            RawRecord::new(RecordId::new(1, 0), encode(&create_log_event(1))),
            create_raw_record(RecordId::new(2, 0), vec![0xff, 0xfe, b'{']),
            RawRecord::new(RecordId::new(3, 0), encode(&create_log_event(3))),
        ];

        let batch = BatchAssembler::new("logs:stream", "log-processors").assemble(&records);

        assert_eq!(batch.record_ids, vec![RecordId::new(1, 0), RecordId::new(3, 0)]);
        assert_eq!(batch.failed_record_ids, vec![RecordId::new(2, 0)]);
    }

    #[test]
    fn batch_of_only_malformed_records_is_empty() {
        let records = vec![
            create_raw_record(RecordId::new(1, 0), "{}"),
            create_raw_record(RecordId::new(2, 0), "[]"),
        ];

        let batch = BatchAssembler::new("logs:stream", "log-processors").assemble(&records);

        assert!(batch.is_empty());
        assert_eq!(batch.failed_record_ids.len(), 2);
    }
}
