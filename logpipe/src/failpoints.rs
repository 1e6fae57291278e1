use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, PipeResult};

/// Triggered after a batch was written to the sink and before any of its records is acknowledged.
pub const CONSUMER_BEFORE_ACKNOWLEDGE: &str = "consumer.before_acknowledge";

/// Triggered before a batch is handed to the sink.
pub const CONSUMER_BEFORE_SINK_WRITE: &str = "consumer.before_sink_write";

/// Evaluates the named fail point, returning an error when it is configured to `return`.
pub fn pipe_fail_point(name: &str) -> PipeResult<()> {
    fail_point!(name, |_| {
        bail!(
            ErrorKind::FailpointTriggered,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
