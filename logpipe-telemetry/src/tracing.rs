use logpipe_config::Environment;
use std::sync::Once;
use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

static INIT_TEST_TRACING: Once = Once::new();

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install the tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Flushes buffered log lines when dropped.
///
/// Logs are written by a background thread, the binary must keep this value alive until it
/// exits or the last lines are lost.
#[must_use = "dropping the flusher stops the log writer"]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber of a binary.
///
/// Output is human readable in [`Environment::Dev`] and one JSON object per line in
/// [`Environment::Prod`].
pub fn init_tracing(app_name: &str, environment: Environment) -> Result<LogFlusher, TracingError> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let (json_layer, pretty_layer) = match environment {
        Environment::Prod => (
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(writer),
            ),
            None,
        ),
        Environment::Dev => (None, Some(fmt::layer().pretty().with_writer(writer))),
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(json_layer)
        .with(pretty_layer)
        .try_init()?;

    info!(app = app_name, environment = %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a subscriber writing to the test output when `ENABLE_TRACING` is set.
///
/// Safe to call from every test, only the first call has an effect.
pub fn init_test_tracing() {
    if std::env::var("ENABLE_TRACING").is_err() {
        return;
    }

    INIT_TEST_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_test_writer()
            .try_init();
    });
}
