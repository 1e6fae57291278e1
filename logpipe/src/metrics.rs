//! Metric names and labels emitted by the log pipeline.

/// Label for the consumer group in metrics.
pub const CONSUMER_GROUP_LABEL: &str = "consumer_group";

/// Label for the stream name in metrics.
pub const STREAM_LABEL: &str = "stream";

// Consumer metrics

/// Counter for records persisted to the sink.
pub const LOGPIPE_RECORDS_PROCESSED_TOTAL: &str = "logpipe_records_processed_total";

/// Counter for batches persisted to the sink.
pub const LOGPIPE_BATCHES_PROCESSED_TOTAL: &str = "logpipe_batches_processed_total";

/// Counter for batches whose sink write failed.
pub const LOGPIPE_BATCH_FAILURES_TOTAL: &str = "logpipe_batch_failures_total";

/// Counter for records that could not be decoded.
pub const LOGPIPE_DECODE_FAILURES_TOTAL: &str = "logpipe_decode_failures_total";

/// Counter for persisted records whose acknowledgment failed.
pub const LOGPIPE_ACK_FAILURES_TOTAL: &str = "logpipe_ack_failures_total";

/// Histogram of sink batch write durations, in seconds.
pub const LOGPIPE_SINK_WRITE_DURATION_SECONDS: &str = "logpipe_sink_write_duration_seconds";

/// Gauge for the number of delivered but unacknowledged records of the group.
pub const LOGPIPE_STREAM_LAG: &str = "logpipe_stream_lag";

/// Gauge for the number of records currently reserved by the backpressure gate.
pub const LOGPIPE_IN_FLIGHT_RECORDS: &str = "logpipe_in_flight_records";

/// Counter for ticks skipped because the backpressure gate refused a reservation.
pub const LOGPIPE_BACKPRESSURE_SKIPS_TOTAL: &str = "logpipe_backpressure_skips_total";

// Producer metrics

/// Counter for records appended to the durable log by the ingestion endpoint.
pub const LOGPIPE_RECORDS_PUBLISHED_TOTAL: &str = "logpipe_records_published_total";

/// Histogram of append durations, in seconds.
pub const LOGPIPE_PUBLISH_DURATION_SECONDS: &str = "logpipe_publish_duration_seconds";
