use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, json};

use crate::codec::encode;
use crate::types::{LogEvent, PAYLOAD_FIELD, RawRecord, RecordId, RecordPayload};

/// Returns a fixed timestamp shifted by `i` seconds.
pub fn timestamp(i: u64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
        + chrono::Duration::seconds(i as i64)
}

/// Creates the `i`-th event of a deterministic sequence, with message `message {i}`.
pub fn create_log_event(i: u64) -> LogEvent {
    let mut fields = Map::new();
    fields.insert("sequence".to_owned(), json!(i));

    LogEvent::new(timestamp(i), "test-app", "INFO", format!("message {i}")).with_fields(fields)
}

/// Creates a record whose payload field holds `payload` verbatim, which may be invalid UTF-8.
pub fn create_raw_record(id: RecordId, payload: impl Into<Vec<u8>>) -> RawRecord {
    RawRecord::new(id, RecordPayload::with_field(PAYLOAD_FIELD, payload))
}

/// Encodes `event` into the payload the producer would append.
pub fn encoded_payload(event: &LogEvent) -> RecordPayload {
    encode(event)
}

/// Extracts the sequence numbers out of the messages of `events`, which must come from
/// [`create_log_event`].
pub fn message_sequences(events: &[LogEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|event| event.message.strip_prefix("message "))
        .filter_map(|i| i.parse().ok())
        .collect()
}
