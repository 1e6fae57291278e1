//! Ingestion service binary.
//!
//! Accepts log events over HTTP and appends them to the Redis stream read by the processor.

use anyhow::Context;
use logpipe_config::Environment;
use logpipe_producer::config::load_producer_config;
use logpipe_producer::startup::Application;
use logpipe_telemetry::tracing::init_tracing;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let environment = Environment::load()?;
    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"), environment)?;

    actix_web::rt::System::new().block_on(async_main())?;

    Ok(())
}

async fn async_main() -> anyhow::Result<()> {
    let config = load_producer_config()?;
    info!(
        host = config.application.host,
        port = config.application.port,
        stream = config.stream.name,
        "starting producer"
    );

    let application = Application::build(config)
        .await
        .context("building the producer application")?;

    if let Err(err) = application.run_until_stopped().await {
        error!(error = %err, "producer stopped with an error");
        return Err(err.into());
    }

    Ok(())
}
