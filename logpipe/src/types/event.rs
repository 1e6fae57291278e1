use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Maximum length, in characters, of [`LogEvent::application`].
pub const MAX_APPLICATION_LEN: usize = 100;

/// Maximum length, in characters, of [`LogEvent::level`].
pub const MAX_LEVEL_LEN: usize = 10;

/// A decoded application log record.
///
/// [`LogEvent`] is only built by the codec, which guarantees that every required attribute is
/// present, that the length limits hold and that `fields` is never an empty object.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// Instant at which the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Name of the emitting application.
    pub application: String,
    /// Severity level, e.g. `INFO`.
    pub level: String,
    /// Free-form message text.
    pub message: String,
    /// Additional structured context, absent when the producer sent none.
    pub fields: Option<Map<String, Value>>,
}

impl LogEvent {
    /// Creates a new [`LogEvent`] without structured fields.
    pub fn new(
        timestamp: DateTime<Utc>,
        application: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            application: application.into(),
            level: level.into(),
            message: message.into(),
            fields: None,
        }
    }

    /// Attaches structured fields, normalizing an empty object to `None`.
    pub fn with_fields(mut self, fields: Map<String, Value>) -> Self {
        self.fields = if fields.is_empty() { None } else { Some(fields) };
        self
    }
}
