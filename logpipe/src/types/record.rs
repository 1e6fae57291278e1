use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Key under which the serialized [`crate::types::LogEvent`] is stored in a log entry.
pub const PAYLOAD_FIELD: &str = "payload";

/// Errors that can occur while parsing a [`RecordId`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordIdParseError {
    #[error("record id '{0}' is not of the form <millis>-<sequence>")]
    Malformed(String),

    #[error("record id '{id}' has an invalid {part} component")]
    InvalidComponent { id: String, part: &'static str },
}

/// Identifier of an entry in the durable log.
///
/// Ids are rendered as `<millis>-<sequence>` and are totally ordered: first by the
/// millisecond timestamp, then by the sequence number within that millisecond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    pub millis: u64,
    pub sequence: u64,
}

impl RecordId {
    /// The smallest possible id, `0-0`.
    pub const MIN: RecordId = RecordId::new(0, 0);

    pub const fn new(millis: u64, sequence: u64) -> Self {
        Self { millis, sequence }
    }

    /// Returns the id that directly follows this one.
    pub fn next(&self) -> Self {
        match self.sequence.checked_add(1) {
            Some(sequence) => Self::new(self.millis, sequence),
            None => Self::new(self.millis.saturating_add(1), 0),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.sequence)
    }
}

impl FromStr for RecordId {
    type Err = RecordIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((millis, sequence)) = s.split_once('-') else {
            return Err(RecordIdParseError::Malformed(s.to_owned()));
        };

        let millis = millis
            .parse()
            .map_err(|_| RecordIdParseError::InvalidComponent {
                id: s.to_owned(),
                part: "millis",
            })?;
        let sequence = sequence
            .parse()
            .map_err(|_| RecordIdParseError::InvalidComponent {
                id: s.to_owned(),
                part: "sequence",
            })?;

        Ok(Self::new(millis, sequence))
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// The field map stored in a log entry.
///
/// Produced by [`crate::codec::encode`], it holds the JSON wire form of an event under
/// [`PAYLOAD_FIELD`]. Values are kept as raw bytes: the log does not guarantee UTF-8, and
/// checking it is part of decoding a single record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordPayload(HashMap<String, Vec<u8>>);

impl RecordPayload {
    pub fn new(fields: HashMap<String, Vec<u8>>) -> Self {
        Self(fields)
    }

    /// Creates a payload made of the single field `key`.
    pub fn with_field(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        let mut fields = HashMap::with_capacity(1);
        fields.insert(key.into(), value.into());

        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn into_inner(self) -> HashMap<String, Vec<u8>> {
        self.0
    }
}

impl From<HashMap<String, Vec<u8>>> for RecordPayload {
    fn from(fields: HashMap<String, Vec<u8>>) -> Self {
        Self(fields)
    }
}

/// An entry read from the durable log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id: RecordId,
    pub payload: RecordPayload,
}

impl RawRecord {
    pub fn new(id: RecordId, payload: impl Into<RecordPayload>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }
}
