//! Conversion between [`LogEvent`] and the payload stored in the durable log.
//!
//! The payload is a JSON object kept under the [`PAYLOAD_FIELD`] key of a log entry:
//!
//! ```json
//! {"ts": "2024-01-01T00:00:00Z", "app": "billing", "level": "INFO", "msg": "...", "fields": {}}
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::{
    LogEvent, MAX_APPLICATION_LEN, MAX_LEVEL_LEN, PAYLOAD_FIELD, RawRecord, RecordId,
    RecordPayload,
};

/// Reasons a record could not be decoded into a [`LogEvent`].
///
/// Every variant carries the id of the offending record. A decode error only excludes its own
/// record from a batch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("record {record_id} has no 'payload' field")]
    MissingPayload { record_id: RecordId },

    #[error("record {record_id} has a payload that is not valid UTF-8: {reason}")]
    InvalidUtf8 { record_id: RecordId, reason: String },

    #[error("record {record_id} has an invalid JSON payload: {reason}")]
    InvalidJson { record_id: RecordId, reason: String },

    #[error("record {record_id} is missing required field '{field}'")]
    MissingField {
        record_id: RecordId,
        field: &'static str,
    },

    #[error("record {record_id} has an invalid timestamp '{value}': {reason}")]
    InvalidTimestamp {
        record_id: RecordId,
        value: String,
        reason: String,
    },

    #[error("record {record_id} field '{field}' is {len} characters long, the limit is {max}")]
    FieldTooLong {
        record_id: RecordId,
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("record {record_id} field '{field}' contains a NUL character")]
    NulCharacter {
        record_id: RecordId,
        field: &'static str,
    },
}

impl DecodeError {
    /// Returns the id of the record that failed to decode.
    pub fn record_id(&self) -> RecordId {
        match self {
            DecodeError::MissingPayload { record_id }
            | DecodeError::InvalidUtf8 { record_id, .. }
            | DecodeError::InvalidJson { record_id, .. }
            | DecodeError::MissingField { record_id, .. }
            | DecodeError::InvalidTimestamp { record_id, .. }
            | DecodeError::FieldTooLong { record_id, .. }
            | DecodeError::NulCharacter { record_id, .. } => *record_id,
        }
    }
}

/// JSON shape of the payload.
///
/// Every attribute is optional here so that absence is reported as [`DecodeError::MissingField`]
/// rather than as a generic parse failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct WireLogEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Map<String, Value>>,
}

/// Decodes a raw log entry into a [`LogEvent`].
pub fn decode(record: &RawRecord) -> Result<LogEvent, DecodeError> {
    let record_id = record.id;

    let Some(payload) = record.payload.get(PAYLOAD_FIELD) else {
        return Err(DecodeError::MissingPayload { record_id });
    };

    let payload = std::str::from_utf8(payload).map_err(|err| DecodeError::InvalidUtf8 {
        record_id,
        reason: err.to_string(),
    })?;

    let wire: WireLogEvent =
        serde_json::from_str(payload).map_err(|err| DecodeError::InvalidJson {
            record_id,
            reason: err.to_string(),
        })?;

    validate(record_id, wire)
}

/// Validates a [`WireLogEvent`] and converts it into a [`LogEvent`].
///
/// Text the sink cannot store is rejected here: NUL characters are refused in every string,
/// including the keys and values nested in `fields`. `record_id` is only used to attribute
/// errors, the ingestion endpoint passes [`RecordId::MIN`] since the record does not exist yet.
pub fn validate(record_id: RecordId, wire: WireLogEvent) -> Result<LogEvent, DecodeError> {
    let ts = required(record_id, "ts", wire.ts)?;
    let application = required(record_id, "app", wire.app)?;
    let level = required(record_id, "level", wire.level)?;
    let message = required(record_id, "msg", wire.msg)?;

    check_len(record_id, "app", &application, MAX_APPLICATION_LEN)?;
    check_len(record_id, "level", &level, MAX_LEVEL_LEN)?;

    check_no_nul(record_id, "app", &application)?;
    check_no_nul(record_id, "level", &level)?;
    check_no_nul(record_id, "msg", &message)?;
    if let Some(fields) = &wire.fields {
        if fields.iter().any(|(key, value)| has_nul(key) || value_has_nul(value)) {
            return Err(DecodeError::NulCharacter {
                record_id,
                field: "fields",
            });
        }
    }

    let timestamp = DateTime::parse_from_rfc3339(&ts)
        .map_err(|err| DecodeError::InvalidTimestamp {
            record_id,
            value: ts.clone(),
            reason: err.to_string(),
        })?
        .with_timezone(&Utc);

    let event = LogEvent::new(timestamp, application, level, message);
    Ok(match wire.fields {
        Some(fields) => event.with_fields(fields),
        None => event,
    })
}

/// Encodes a [`LogEvent`] into the field map appended to the durable log.
///
/// The timestamp is rendered in UTC with the `Z` suffix and only as many fractional digits as
/// needed.
pub fn encode(event: &LogEvent) -> RecordPayload {
    let wire = WireLogEvent {
        ts: Some(event.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        app: Some(event.application.clone()),
        level: Some(event.level.clone()),
        msg: Some(event.message.clone()),
        fields: event.fields.clone(),
    };

    // Serializing a struct of strings and JSON values cannot fail.
    let payload = serde_json::to_vec(&wire).unwrap_or_default();

    RecordPayload::with_field(PAYLOAD_FIELD, payload)
}

fn required(
    record_id: RecordId,
    field: &'static str,
    value: Option<String>,
) -> Result<String, DecodeError> {
    value.ok_or(DecodeError::MissingField { record_id, field })
}

fn check_no_nul(record_id: RecordId, field: &'static str, value: &str) -> Result<(), DecodeError> {
    if has_nul(value) {
        return Err(DecodeError::NulCharacter { record_id, field });
    }

    Ok(())
}

fn has_nul(value: &str) -> bool {
    value.contains('\0')
}

fn value_has_nul(value: &Value) -> bool {
    match value {
        Value::String(string) => has_nul(string),
        Value::Array(values) => values.iter().any(value_has_nul),
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| has_nul(key) || value_has_nul(value)),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

fn check_len(
    record_id: RecordId,
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), DecodeError> {
    let len = value.chars().count();
    if len > max {
        return Err(DecodeError::FieldTooLong {
            record_id,
            field,
            len,
            max,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn raw(payload: &str) -> RawRecord {
        RawRecord::new(
            RecordId::new(1, 0),
            RecordPayload::with_field(PAYLOAD_FIELD, payload),
        )
    }

    #[test]
    fn decodes_complete_payload() {
        let record = raw(
            r#"{"ts":"2024-05-01T12:30:00.250+02:00","app":"billing","level":"WARN","msg":"slow","fields":{"ms":812}}"#,
        );

        let event = decode(&record).unwrap();

        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap()
                + chrono::Duration::milliseconds(250)
        );
        assert_eq!(event.application, "billing");
        assert_eq!(event.level, "WARN");
        assert_eq!(event.message, "slow");
        assert_eq!(event.fields.unwrap().get("ms"), Some(&json!(812)));
    }

    #[test]
    fn absent_null_and_empty_fields_decode_to_none() {
        for fields in ["", r#","fields":null"#, r#","fields":{}"#] {
            let payload =
                format!(r#"{{"ts":"2024-01-01T00:00:00Z","app":"a","level":"INFO","msg":"m"{fields}}}"#);
            assert_eq!(decode(&raw(&payload)).unwrap().fields, None);
        }
    }

    #[test]
    fn missing_payload_key_is_rejected() {
        let record = RawRecord::new(RecordId::new(9, 1), RecordPayload::default());

        let err = decode(&record).unwrap_err();

        assert_eq!(
            err,
            DecodeError::MissingPayload {
                record_id: RecordId::new(9, 1)
            }
        );
        assert_eq!(err.record_id(), RecordId::new(9, 1));
    }

    #[test]
    fn payload_that_is_not_utf8_is_rejected() {
        let record = RawRecord::new(
            RecordId::new(3, 0),
            RecordPayload::with_field(PAYLOAD_FIELD, vec![0xff, 0xfe, b'{']),
        );

        let err = decode(&record).unwrap_err();

        assert!(matches!(err, DecodeError::InvalidUtf8 { .. }));
        assert_eq!(err.record_id(), RecordId::new(3, 0));
    }

    #[test]
    fn nul_characters_are_rejected() {
        let err = decode(&raw(
            r#"{"ts":"2024-01-01T00:00:00Z","app":"a","level":"INFO","msg":"x\u0000y"}"#,
        ))
        .unwrap_err();
        assert_eq!(
            err,
            DecodeError::NulCharacter {
                record_id: RecordId::new(1, 0),
                field: "msg"
            }
        );

        let err = decode(&raw(
            r#"{"ts":"2024-01-01T00:00:00Z","app":"a\u0000","level":"INFO","msg":"m"}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, DecodeError::NulCharacter { field: "app", .. }));

        for fields in [
            r#"{"user":"u\u0000"}"#,
            r#"{"nested":{"tags":["ok","b\u0000d"]}}"#,
            r#"{"k\u0000":1}"#,
        ] {
            let payload = format!(
                r#"{{"ts":"2024-01-01T00:00:00Z","app":"a","level":"INFO","msg":"m","fields":{fields}}}"#
            );
            assert!(matches!(
                decode(&raw(&payload)),
                Err(DecodeError::NulCharacter { field: "fields", .. })
            ));
        }

        // An escaped backslash followed by "u0000" is ordinary text.
        let event = decode(&raw(
            r#"{"ts":"2024-01-01T00:00:00Z","app":"a","level":"INFO","msg":"x\\u0000"}"#,
        ))
        .unwrap();
        assert_eq!(event.message, "x\\u0000");
    }

    #[test]
    fn non_json_payload_is_rejected() {
        assert!(matches!(
            decode(&raw("not-json")),
            Err(DecodeError::InvalidJson { .. })
        ));
    }

    #[test]
    fn missing_required_attribute_is_rejected() {
        let err = decode(&raw(r#"{"ts":"2024-01-01T00:00:00Z","app":"a","msg":"m"}"#)).unwrap_err();

        assert!(matches!(
            err,
            DecodeError::MissingField { field: "level", .. }
        ));
    }

    #[test]
    fn invalid_timestamp_is_rejected() {
        let err = decode(&raw(r#"{"ts":"yesterday","app":"a","level":"INFO","msg":"m"}"#))
            .unwrap_err();

        assert!(matches!(err, DecodeError::InvalidTimestamp { .. }));
    }

    #[test]
    fn length_limits_are_enforced() {
        let app = "a".repeat(MAX_APPLICATION_LEN + 1);
        let payload =
            format!(r#"{{"ts":"2024-01-01T00:00:00Z","app":"{app}","level":"INFO","msg":"m"}}"#);
        assert!(matches!(
            decode(&raw(&payload)),
            Err(DecodeError::FieldTooLong { field: "app", len: 101, max: 100, .. })
        ));

        let err = decode(&raw(
            r#"{"ts":"2024-01-01T00:00:00Z","app":"a","level":"CRITICALLYY","msg":"m"}"#,
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::FieldTooLong { field: "level", len: 11, max: 10, .. }
        ));

        // Both limits are inclusive.
        let event = decode(&raw(
            r#"{"ts":"2024-01-01T00:00:00Z","app":"a","level":"CRITICALLY","msg":"m"}"#,
        ))
        .unwrap();
        assert_eq!(event.level, "CRITICALLY");
        let app = "a".repeat(MAX_APPLICATION_LEN);
        let payload =
            format!(r#"{{"ts":"2024-01-01T00:00:00Z","app":"{app}","level":"INFO","msg":"m"}}"#);
        assert!(decode(&raw(&payload)).is_ok());

        // Limits count characters, not bytes.
        let app = "é".repeat(MAX_APPLICATION_LEN);
        let payload =
            format!(r#"{{"ts":"2024-01-01T00:00:00Z","app":"{app}","level":"INFO","msg":"m"}}"#);
        assert!(decode(&raw(&payload)).is_ok());
    }

    #[test]
    fn encode_produces_decodable_payload() {
        let mut fields = Map::new();
        fields.insert("user".to_owned(), json!("u-1"));
        let event = LogEvent::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            "api",
            "ERROR",
            "boom",
        )
        .with_fields(fields);

        let payload = encode(&event);
        let json: Value = serde_json::from_slice(payload.get(PAYLOAD_FIELD).unwrap()).unwrap();
        assert_eq!(json["ts"], json!("2024-01-01T00:00:00Z"));
        assert_eq!(json["app"], json!("api"));

        let decoded = decode(&RawRecord::new(RecordId::new(1, 0), payload)).unwrap();
        assert_eq!(decoded, event);
    }
}
