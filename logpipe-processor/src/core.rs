use logpipe::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use logpipe::consumer::LogConsumer;
use logpipe::log::redis::RedisLog;
use logpipe::sink::Sink;
use logpipe::sink::postgres::PostgresSink;
use logpipe::workers::base::{Worker, WorkerHandle};
use logpipe_config::shared::{
    ConsumerConfig, PgConnectionConfig, ProcessorConfig, RedisConfig, StreamConfig,
};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ProcessorResult;
use crate::migrations::migrate_sink;

/// Runs the processor until a shutdown signal is received.
///
/// Migrates the sink schema, connects the log and the sink, then runs the consumer worker.
/// On SIGINT or SIGTERM the worker finishes its in-flight tick before the connections are
/// closed.
pub async fn start_processor_with_config(config: ProcessorConfig) -> ProcessorResult<()> {
    info!("starting processor service");

    log_config(&config);

    migrate_sink(&config.database).await?;

    let log = RedisLog::connect(&config.redis).await?;
    let sink = PostgresSink::connect(&config.database, &config.sink).await?;

    // A failed registration aborts startup rather than leaving the worker unstoppable.
    let signals = ShutdownSignals::register()?;

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let handle = LogConsumer::new(config.stream, config.consumer, log.clone(), sink.clone())?
        .into_worker(shutdown_rx)
        .start()
        .await?;

    let signal_handle = spawn_signal_handler(signals, shutdown_tx);

    // The worker only returns after shutdown, once its last tick completed.
    let result = handle.wait().await;

    signal_handle.abort();
    if let Err(err) = signal_handle.await {
        if err.is_panic() {
            warn!(error = %err, "signal handler task panicked");
        }
    }

    if let Err(err) = sink.shutdown().await {
        warn!(error = %err, "failed to close the sink pool");
    }
    if let Err(err) = log.quit().await {
        warn!(error = %err, "failed to close the log connections");
    }

    result?;

    info!("processor service completed");

    Ok(())
}

/// Unix signals requesting the processor to stop.
struct ShutdownSignals {
    sigint: Signal,
    sigterm: Signal,
}

impl ShutdownSignals {
    fn register() -> std::io::Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
        })
    }
}

/// Sends a shutdown request on the first SIGINT or SIGTERM.
///
/// The sender is only used once a signal arrived, workers never observe a closed channel
/// before that.
fn spawn_signal_handler(signals: ShutdownSignals, shutdown_tx: ShutdownTx) -> JoinHandle<()> {
    let ShutdownSignals {
        mut sigint,
        mut sigterm,
    } = signals;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {
                info!("sigint (ctrl+c) received, shutting down processor");
            }
            _ = sigterm.recv() => {
                info!("sigterm received, shutting down processor");
            }
        }

        if let Err(err) = shutdown_tx.shutdown() {
            warn!(error = ?err, "failed to send shutdown signal");
        }
    })
}

fn log_config(config: &ProcessorConfig) {
    log_redis_config(&config.redis);
    log_stream_config(&config.stream);
    log_consumer_config(&config.consumer);
    log_pg_connection_config(&config.database);
    debug!(
        max_connections = config.sink.max_connections,
        metrics_port = config.metrics_port,
        "sink config"
    );
}

fn log_redis_config(config: &RedisConfig) {
    debug!(
        host = config.host,
        port = config.port,
        username = config.username,
        "redis config"
    );
}

fn log_stream_config(config: &StreamConfig) {
    debug!(
        stream = config.name,
        group = config.group,
        consumer = config.consumer,
        "stream config"
    );
}

fn log_consumer_config(config: &ConsumerConfig) {
    debug!(
        batch_size = config.batch_size,
        max_concurrent_batches = config.max_concurrent_batches,
        poll_interval_ms = config.poll_interval_ms,
        backpressure_threshold = config.backpressure_threshold(),
        "consumer config"
    );
}

fn log_pg_connection_config(config: &PgConnectionConfig) {
    debug!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        "sink postgres connection config",
    );
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn shutdown_is_only_requested_by_a_signal() {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let signals = ShutdownSignals::register().unwrap();
        let handle = spawn_signal_handler(signals, shutdown_tx);

        tokio::time::sleep(Duration::from_millis(50)).await;

        // The handler still holds the sender and has not sent anything.
        assert!(!shutdown_rx.has_changed().unwrap());
        assert!(!handle.is_finished());

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert!(shutdown_rx.has_changed().is_err());
    }
}
