//! Error types and result definitions for log pipeline operations.
//!
//! Provides a classified error type with captured diagnostic metadata for the consumer
//! pipeline. A [`PipeError`] carries its [`ErrorKind`], a static description, an optional
//! dynamic detail and the error it originated from.

use logpipe_config::shared::ValidationError;
use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for pipeline operations using [`PipeError`] as the error type.
pub type PipeResult<T> = Result<T, PipeError>;

/// Detailed payload stored in a [`PipeError`].
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for pipeline operations.
///
/// [`PipeError`] represents a classified error, optionally carrying a dynamic detail string
/// and an originating source error.
#[derive(Debug, Clone)]
pub struct PipeError {
    payload: Box<ErrorPayload>,
}

/// Categories of errors that can occur in the pipeline.
///
/// Every kind in the log and sink groups is retryable from the consumer loop's point of view:
/// nothing was acknowledged, so the affected records stay pending.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Durable log errors
    LogConnectionFailed,
    LogOperationFailed,
    InvalidRecordId,

    // Sink errors
    SinkConnectionFailed,
    SinkQueryFailed,
    SinkConstraintViolation,

    // Data errors
    ConversionError,

    // Configuration errors
    ConfigError,

    // Workflow errors
    ConsumerWorkerPanic,

    // Used by fault injection tests.
    #[cfg(feature = "failpoints")]
    FailpointTriggered,
}

impl PipeError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the dynamic detail of this error, if any.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Returns the captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    /// Attaches an originating error and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        PipeError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for PipeError {
    fn eq(&self, other: &PipeError) -> bool {
        self.payload.kind == other.payload.kind
    }
}

impl Hash for PipeError {
    /// Hashes only the kind and static description so that repeated occurrences of the
    /// same failure group together regardless of detail and location.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.kind.hash(state);
        self.payload.description.hash(state);
    }
}

impl fmt::Display for PipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        write_detail(payload.detail.as_deref(), f, 1)?;
        write_backtrace(payload.backtrace.as_ref(), f, 1)?;

        Ok(())
    }
}

impl error::Error for PipeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered_backtrace = format!("{backtrace}");
    if !rendered_backtrace.trim().is_empty() {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered_backtrace.lines() {
            write!(f, "\n{indent_str}  {}", line.trim_end())?;
        }
    }

    Ok(())
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    let indent_str = "  ".repeat(indent);
    if detail.trim().is_empty() {
        return write!(f, "\n{indent_str}Detail: <empty>");
    }

    write!(f, "\n{indent_str}Detail:")?;
    for line in detail.lines() {
        write!(f, "\n{indent_str}  {}", line.trim_end())?;
    }

    Ok(())
}

/// Creates a [`PipeError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for PipeError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> PipeError {
        PipeError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`PipeError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for PipeError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> PipeError {
        PipeError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Rejects consumer settings the loop cannot run with.
impl From<ValidationError> for PipeError {
    #[track_caller]
    fn from(err: ValidationError) -> PipeError {
        let detail = err.to_string();
        PipeError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid consumer configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`sqlx::Error`] into a sink error.
///
/// Pool and I/O failures mean the store is unreachable, constraint violations are reported
/// separately because retrying the same batch will fail the same way.
impl From<sqlx::Error> for PipeError {
    #[track_caller]
    fn from(err: sqlx::Error) -> PipeError {
        let (kind, description) = match &err {
            sqlx::Error::Database(db_err) => match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation => (
                    ErrorKind::SinkConstraintViolation,
                    "Sink constraint violation",
                ),
                _ => (ErrorKind::SinkQueryFailed, "Sink query failed"),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut => {
                (ErrorKind::SinkConnectionFailed, "Sink connection failed")
            }
            _ => (ErrorKind::SinkQueryFailed, "Sink operation failed"),
        };

        let detail = err.to_string();
        PipeError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Converts [`fred::error::Error`] into a durable log error.
impl From<fred::error::Error> for PipeError {
    #[track_caller]
    fn from(err: fred::error::Error) -> PipeError {
        use fred::error::ErrorKind as RedisErrorKind;

        let (kind, description) = match err.kind() {
            RedisErrorKind::IO
            | RedisErrorKind::Timeout
            | RedisErrorKind::Canceled
            | RedisErrorKind::Tls
            | RedisErrorKind::Auth => (ErrorKind::LogConnectionFailed, "Log connection failed"),
            RedisErrorKind::Config | RedisErrorKind::Url => {
                (ErrorKind::ConfigError, "Log client configuration invalid")
            }
            RedisErrorKind::Parse => (ErrorKind::ConversionError, "Log response parsing failed"),
            _ => (ErrorKind::LogOperationFailed, "Log operation failed"),
        };

        let detail = err.to_string();
        PipeError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;
    use crate::{bail, pipe_error};

    fn hash_of(err: &PipeError) -> u64 {
        let mut hasher = DefaultHasher::new();
        err.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn error_exposes_kind_and_detail() {
        let err = pipe_error!(
            ErrorKind::SinkQueryFailed,
            "Batch insert failed",
            "relation \"logs\" does not exist"
        );

        assert_eq!(err.kind(), ErrorKind::SinkQueryFailed);
        assert_eq!(err.detail(), Some("relation \"logs\" does not exist"));
        assert!(err.to_string().starts_with("[SinkQueryFailed] Batch insert failed @ "));
        assert!(err.location().file().ends_with("error.rs"));
    }

    #[test]
    fn hash_ignores_detail_and_location() {
        let a = pipe_error!(ErrorKind::SinkQueryFailed, "Batch insert failed", "first");
        let b = pipe_error!(ErrorKind::SinkQueryFailed, "Batch insert failed", "second");
        let c = pipe_error!(ErrorKind::SinkQueryFailed, "Another description");

        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(hash_of(&a), hash_of(&c));
    }

    #[test]
    fn validation_errors_are_config_errors() {
        let err: PipeError = ValidationError::InvalidFieldValue {
            field: "consumer.batch_size",
            constraint: "must be greater than 0",
        }
        .into();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(err.detail().unwrap().contains("consumer.batch_size"));
        assert!(error::Error::source(&err).is_some());
    }

    #[test]
    fn bail_returns_early() {
        fn fails() -> PipeResult<()> {
            bail!(ErrorKind::LogOperationFailed, "Consumer group does not exist");
        }

        assert_eq!(fails().unwrap_err().kind(), ErrorKind::LogOperationFailed);
    }
}
