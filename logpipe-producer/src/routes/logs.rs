use actix_web::{
    HttpResponse, Responder, ResponseError,
    http::{StatusCode, header::ContentType},
    web::{Bytes, Data, Json},
};
use logpipe::codec::{DecodeError, WireLogEvent, encode, validate};
use logpipe::error::PipeError;
use logpipe::log::LogClient;
use logpipe::metrics::{
    LOGPIPE_PUBLISH_DURATION_SECONDS, LOGPIPE_RECORDS_PUBLISHED_TOTAL, STREAM_LABEL,
};
use logpipe::types::RecordId;
use logpipe_config::shared::StreamConfig;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error};

use crate::routes::ErrorMessage;

#[derive(Debug, Error)]
pub enum PublishLogError {
    #[error("The request body is not a valid log event: {0}")]
    InvalidBody(serde_json::Error),

    #[error(transparent)]
    InvalidEvent(DecodeError),

    #[error("The log record could not be appended: {0}")]
    Log(#[from] PipeError),
}

impl PublishLogError {
    pub fn to_message(&self) -> String {
        match self {
            PublishLogError::InvalidBody(err) => format!("invalid request body: {err}"),
            PublishLogError::InvalidEvent(DecodeError::MissingField { field, .. }) => {
                format!("missing required field '{field}'")
            }
            PublishLogError::InvalidEvent(DecodeError::InvalidTimestamp { value, reason, .. }) => {
                format!("invalid timestamp '{value}': {reason}")
            }
            PublishLogError::InvalidEvent(DecodeError::FieldTooLong {
                field, len, max, ..
            }) => {
                format!("field '{field}' is {len} characters long, the limit is {max}")
            }
            PublishLogError::InvalidEvent(DecodeError::NulCharacter { field, .. }) => {
                format!("field '{field}' contains a NUL character")
            }
            PublishLogError::InvalidEvent(_) => "invalid log event".to_string(),
            // Do not expose log connection details.
            PublishLogError::Log(_) => "internal server error".to_string(),
        }
    }
}

impl ResponseError for PublishLogError {
    fn status_code(&self) -> StatusCode {
        match self {
            PublishLogError::InvalidBody(_) | PublishLogError::InvalidEvent(_) => {
                StatusCode::BAD_REQUEST
            }
            PublishLogError::Log(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error_message = ErrorMessage {
            error: self.to_message(),
        };

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(error_message)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishLogResponse {
    #[serde(rename = "recordId")]
    pub record_id: RecordId,
}

/// Validates a log event and appends it to the stream.
///
/// The body is parsed by hand rather than through the `Json` extractor so that malformed
/// bodies get the same error shape as invalid events. Registered per [`LogClient`]
/// implementation, see [`crate::startup::configure_routes`].
pub async fn publish_log<L>(
    log: Data<L>,
    stream: Data<StreamConfig>,
    body: Bytes,
) -> Result<impl Responder, PublishLogError>
where
    L: LogClient + 'static,
{
    let wire: WireLogEvent =
        serde_json::from_slice(&body).map_err(PublishLogError::InvalidBody)?;
    let event = validate(RecordId::MIN, wire).map_err(PublishLogError::InvalidEvent)?;

    let started_at = Instant::now();
    let result = log.append(&stream.name, encode(&event)).await;
    histogram!(
        LOGPIPE_PUBLISH_DURATION_SECONDS,
        STREAM_LABEL => stream.name.clone()
    )
    .record(started_at.elapsed().as_secs_f64());

    let record_id = result.inspect_err(|err| {
        error!(stream = %stream.name, error = %err, "failed to append a log record");
    })?;

    counter!(LOGPIPE_RECORDS_PUBLISHED_TOTAL, STREAM_LABEL => stream.name.clone()).increment(1);
    debug!(stream = %stream.name, %record_id, app = %event.application, "published log record");

    Ok(Json(PublishLogResponse { record_id }))
}
