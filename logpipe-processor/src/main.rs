//! Processor service binary.
//!
//! Consumes log records from the Redis stream and persists them in Postgres until it receives
//! SIGINT or SIGTERM.

use logpipe_config::Environment;
use logpipe_config::shared::ProcessorConfig;
use logpipe_telemetry::metrics::init_metrics;
use logpipe_telemetry::tracing::init_tracing;
use std::process::ExitCode;
use tracing::error;

use crate::config::load_processor_config;
use crate::core::start_processor_with_config;
use crate::error::{ProcessorError, ProcessorResult};

mod config;
mod core;
mod error;
mod migrations;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> ProcessorResult<()> {
    let config = load_processor_config()?;
    let environment = Environment::load().map_err(ProcessorError::config)?;

    let _log_flusher =
        init_tracing(env!("CARGO_BIN_NAME"), environment).map_err(ProcessorError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config))
}

async fn async_main(config: ProcessorConfig) -> ProcessorResult<()> {
    // The exporter spawns its listener on the current runtime.
    init_metrics(env!("CARGO_BIN_NAME"), config.metrics_port).map_err(ProcessorError::config)?;

    if let Err(err) = start_processor_with_config(config).await {
        error!("{err}");
        return Err(err);
    }

    Ok(())
}
