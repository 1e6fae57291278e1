//! Tick-driven consumer loop with pending-entry recovery and ack-on-write.
//!
//! Every tick runs the following procedure, and ticks never overlap:
//!
//! 1. Ensure the consumer group exists.
//! 2. Reserve a batch worth of records on the [`BackpressureGate`], or end the tick.
//! 3. Read records still pending for this consumer. If there are any, persist and acknowledge
//!    them and end the tick without polling new records.
//! 4. Otherwise read never-delivered records and persist and acknowledge them.
//!
//! A record is acknowledged only after the sink reported its batch as written, so a crash at any
//! point leaves unpersisted records pending and they are replayed by step 3 after a restart.

use logpipe_config::shared::{ConsumerConfig, StreamConfig};
use metrics::{counter, gauge, histogram};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::concurrency::backpressure::BackpressureGate;
use crate::concurrency::shutdown::ShutdownRx;
use crate::consumer::batch::BatchAssembler;
use crate::error::{ErrorKind, PipeError, PipeResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{CONSUMER_BEFORE_ACKNOWLEDGE, CONSUMER_BEFORE_SINK_WRITE, pipe_fail_point};
use crate::log::LogClient;
use crate::metrics::{
    CONSUMER_GROUP_LABEL, LOGPIPE_ACK_FAILURES_TOTAL, LOGPIPE_BACKPRESSURE_SKIPS_TOTAL,
    LOGPIPE_BATCH_FAILURES_TOTAL, LOGPIPE_BATCHES_PROCESSED_TOTAL,
    LOGPIPE_RECORDS_PROCESSED_TOTAL, LOGPIPE_SINK_WRITE_DURATION_SECONDS, LOGPIPE_STREAM_LAG,
    STREAM_LABEL,
};
use crate::pipe_error;
use crate::sink::Sink;
use crate::types::RawRecord;
use crate::workers::base::{Worker, WorkerHandle};

/// Phase of the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Waiting for the next tick.
    Idle,
    /// The consumer group is known to exist for the current tick.
    GroupEnsured,
    /// Replaying records delivered earlier but never acknowledged.
    DrainingPending,
    /// Reading never-delivered records.
    PollingNew,
    /// The current tick was refused by the backpressure gate.
    Backpressured,
    /// The worker loop exited.
    Stopped,
}

impl ConsumerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerState::Idle => "idle",
            ConsumerState::GroupEnsured => "group_ensured",
            ConsumerState::DrainingPending => "draining_pending",
            ConsumerState::PollingNew => "polling_new",
            ConsumerState::Backpressured => "backpressured",
            ConsumerState::Stopped => "stopped",
        }
    }
}

/// Counts describing how one batch was handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Records written to the sink.
    pub persisted: usize,
    /// Records acknowledged after the write.
    pub acknowledged: usize,
    /// Records that failed to decode and were left pending.
    pub decode_failures: usize,
    /// Persisted records whose acknowledgment failed; they will be delivered again.
    pub ack_failures: usize,
}

/// Result of a single tick of the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The gate refused a reservation, nothing was read.
    Backpressured,
    /// A batch of pending records was replayed.
    DrainedPending(BatchOutcome),
    /// A batch of new records was consumed.
    PolledNew(BatchOutcome),
    /// Neither pending nor new records were available.
    NoRecords,
}

/// Consumer reading a stream through a consumer group and persisting it to a [`Sink`].
///
/// [`LogConsumer::tick`] runs a single iteration of the loop and is what tests drive directly.
/// [`LogConsumer::into_worker`] wraps the consumer into a [`Worker`] that runs ticks on a fixed
/// interval until shutdown.
#[derive(Debug)]
pub struct LogConsumer<L, S> {
    stream: StreamConfig,
    config: ConsumerConfig,
    log: L,
    sink: S,
    gate: BackpressureGate,
    assembler: BatchAssembler,
    state_tx: watch::Sender<ConsumerState>,
}

impl<L, S> LogConsumer<L, S>
where
    L: LogClient + Send + Sync,
    S: Sink + Send + Sync,
{
    /// Creates a consumer with its own [`BackpressureGate`].
    ///
    /// Fails with [`ErrorKind::ConfigError`] when the stream names are empty or when the batch
    /// size, the number of concurrent batches or the poll interval is zero.
    pub fn new(
        stream: StreamConfig,
        config: ConsumerConfig,
        log: L,
        sink: S,
    ) -> PipeResult<Self> {
        stream.validate()?;
        config.validate()?;

        let gate = BackpressureGate::new(
            config.backpressure_threshold(),
            &stream.name,
            &stream.group,
        );
        let assembler = BatchAssembler::new(&stream.name, &stream.group);
        let (state_tx, _) = watch::channel(ConsumerState::Idle);

        Ok(Self {
            stream,
            config,
            log,
            sink,
            gate,
            assembler,
            state_tx,
        })
    }

    /// Returns the gate bounding this consumer's in-flight records.
    pub fn gate(&self) -> &BackpressureGate {
        &self.gate
    }

    /// Returns the current phase of the loop.
    pub fn state(&self) -> ConsumerState {
        *self.state_tx.borrow()
    }

    /// Subscribes to phase changes of the loop.
    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state_tx.subscribe()
    }

    /// Wraps the consumer into a worker that stops when `shutdown_rx` fires.
    pub fn into_worker(self, shutdown_rx: ShutdownRx) -> ConsumerWorker<L, S> {
        ConsumerWorker {
            consumer: self,
            shutdown_rx,
        }
    }

    /// Runs one iteration of the consumer loop.
    ///
    /// Failures of the log or the sink are returned as errors. They never leave records
    /// acknowledged without being persisted, so the next tick can simply retry.
    pub async fn tick(&self) -> PipeResult<TickOutcome> {
        let result = self.try_tick().await;
        self.update_state(ConsumerState::Idle);

        result
    }

    async fn try_tick(&self) -> PipeResult<TickOutcome> {
        let StreamConfig {
            name: stream,
            group,
            consumer,
        } = &self.stream;
        let batch_size = self.config.batch_size;

        self.log.ensure_group(stream, group).await?;
        self.update_state(ConsumerState::GroupEnsured);

        // Held until the end of the tick, whatever path it takes.
        let Some(_reservation) = self.gate.try_reserve(batch_size) else {
            self.update_state(ConsumerState::Backpressured);
            counter!(
                LOGPIPE_BACKPRESSURE_SKIPS_TOTAL,
                STREAM_LABEL => stream.clone(),
                CONSUMER_GROUP_LABEL => group.clone()
            )
            .increment(1);

            return Ok(TickOutcome::Backpressured);
        };

        self.update_state(ConsumerState::DrainingPending);
        let pending = self
            .log
            .read_pending(stream, group, consumer, batch_size)
            .await?;
        if !pending.is_empty() {
            info!(
                stream = %stream,
                group = %group,
                batch_size = pending.len(),
                "replaying pending records"
            );
            let outcome = self.persist_and_acknowledge(pending).await?;

            return Ok(TickOutcome::DrainedPending(outcome));
        }

        self.update_state(ConsumerState::PollingNew);
        let records = self
            .log
            .read_new(stream, group, consumer, batch_size)
            .await?;
        if records.is_empty() {
            return Ok(TickOutcome::NoRecords);
        }

        let outcome = self.persist_and_acknowledge(records).await?;

        Ok(TickOutcome::PolledNew(outcome))
    }

    /// Persists the decodable records of `records` and acknowledges them once written.
    async fn persist_and_acknowledge(&self, records: Vec<RawRecord>) -> PipeResult<BatchOutcome> {
        let batch = self.assembler.assemble(&records);
        let mut outcome = BatchOutcome {
            decode_failures: batch.failed_record_ids.len(),
            ..Default::default()
        };

        if batch.is_empty() {
            warn!(
                stream = %self.stream.name,
                failed_records = outcome.decode_failures,
                "no record of the batch could be decoded, they stay pending and block new records"
            );

            return Ok(outcome);
        }

        #[cfg(feature = "failpoints")]
        pipe_fail_point(CONSUMER_BEFORE_SINK_WRITE)?;

        let persisted = batch.events.len();
        let started_at = Instant::now();
        let result = self.sink.batch_insert(batch.events).await;
        histogram!(
            LOGPIPE_SINK_WRITE_DURATION_SECONDS,
            STREAM_LABEL => self.stream.name.clone(),
            CONSUMER_GROUP_LABEL => self.stream.group.clone()
        )
        .record(started_at.elapsed().as_secs_f64());

        if let Err(err) = result {
            counter!(
                LOGPIPE_BATCH_FAILURES_TOTAL,
                STREAM_LABEL => self.stream.name.clone(),
                CONSUMER_GROUP_LABEL => self.stream.group.clone()
            )
            .increment(1);

            return Err(err);
        }

        outcome.persisted = persisted;
        counter!(
            LOGPIPE_RECORDS_PROCESSED_TOTAL,
            STREAM_LABEL => self.stream.name.clone(),
            CONSUMER_GROUP_LABEL => self.stream.group.clone()
        )
        .increment(persisted as u64);
        counter!(
            LOGPIPE_BATCHES_PROCESSED_TOTAL,
            STREAM_LABEL => self.stream.name.clone(),
            CONSUMER_GROUP_LABEL => self.stream.group.clone()
        )
        .increment(1);

        #[cfg(feature = "failpoints")]
        pipe_fail_point(CONSUMER_BEFORE_ACKNOWLEDGE)?;

        for record_id in batch.record_ids {
            match self
                .log
                .acknowledge(&self.stream.name, &self.stream.group, record_id)
                .await
            {
                Ok(()) => outcome.acknowledged += 1,
                Err(err) => {
                    outcome.ack_failures += 1;
                    warn!(
                        stream = %self.stream.name,
                        record_id = %record_id,
                        error = %err,
                        "failed to acknowledge a persisted record, it will be delivered again"
                    );
                }
            }
        }

        if outcome.ack_failures > 0 {
            counter!(
                LOGPIPE_ACK_FAILURES_TOTAL,
                STREAM_LABEL => self.stream.name.clone(),
                CONSUMER_GROUP_LABEL => self.stream.group.clone()
            )
            .increment(outcome.ack_failures as u64);
        }

        Ok(outcome)
    }

    /// Publishes the number of pending entries of the group as the stream lag.
    async fn refresh_stream_lag(&self) {
        match self
            .log
            .pending_count(&self.stream.name, &self.stream.group)
            .await
        {
            Ok(pending) => {
                gauge!(
                    LOGPIPE_STREAM_LAG,
                    STREAM_LABEL => self.stream.name.clone(),
                    CONSUMER_GROUP_LABEL => self.stream.group.clone()
                )
                .set(pending as f64);
            }
            Err(err) => debug!(error = %err, "could not refresh the stream lag"),
        }
    }

    fn update_state(&self, state: ConsumerState) {
        self.state_tx.send_replace(state);
    }

    fn log_outcome(&self, outcome: &TickOutcome) {
        match outcome {
            TickOutcome::Backpressured => warn!(
                stream = %self.stream.name,
                in_flight = self.gate.in_flight(),
                threshold = self.gate.threshold(),
                "backpressure active, pausing stream consumption"
            ),
            TickOutcome::DrainedPending(outcome) | TickOutcome::PolledNew(outcome) => info!(
                stream = %self.stream.name,
                persisted = outcome.persisted,
                acknowledged = outcome.acknowledged,
                decode_failures = outcome.decode_failures,
                ack_failures = outcome.ack_failures,
                "processed batch"
            ),
            TickOutcome::NoRecords => debug!(stream = %self.stream.name, "no records available"),
        }
    }
}

/// A [`LogConsumer`] bound to a shutdown signal, ready to be started.
#[derive(Debug)]
pub struct ConsumerWorker<L, S> {
    consumer: LogConsumer<L, S>,
    shutdown_rx: ShutdownRx,
}

impl<L, S> ConsumerWorker<L, S>
where
    L: LogClient + Send + Sync + 'static,
    S: Sink + Send + Sync + 'static,
{
    async fn run(self) -> PipeResult<()> {
        let ConsumerWorker {
            consumer,
            mut shutdown_rx,
        } = self;

        info!(
            stream = %consumer.stream.name,
            group = %consumer.stream.group,
            consumer = %consumer.stream.consumer,
            log = L::name(),
            sink = S::name(),
            batch_size = consumer.config.batch_size,
            poll_interval_ms = consumer.config.poll_interval_ms,
            "starting log consumer"
        );

        let mut ticker = interval(consumer.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // The tick itself runs outside of the select so that shutdown never interrupts a
            // batch between its sink write and its acknowledgments.
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    info!("log consumer received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {}
            }

            match consumer.tick().await {
                Ok(outcome) => consumer.log_outcome(&outcome),
                Err(err) => error!(
                    stream = %consumer.stream.name,
                    error = %err,
                    "consumer tick failed, retrying on the next tick"
                ),
            }

            consumer.refresh_stream_lag().await;
        }

        consumer.update_state(ConsumerState::Stopped);
        info!(stream = %consumer.stream.name, "log consumer stopped");

        Ok(())
    }
}

impl<L, S> Worker<ConsumerWorkerHandle, ConsumerState> for ConsumerWorker<L, S>
where
    L: LogClient + Send + Sync + 'static,
    S: Sink + Send + Sync + 'static,
{
    type Error = PipeError;

    async fn start(self) -> PipeResult<ConsumerWorkerHandle> {
        let state_rx = self.consumer.subscribe_state();
        let join_handle = tokio::spawn(self.run());

        Ok(ConsumerWorkerHandle {
            state_rx,
            join_handle,
        })
    }
}

/// Handle to a running consumer worker.
#[derive(Debug)]
pub struct ConsumerWorkerHandle {
    state_rx: watch::Receiver<ConsumerState>,
    join_handle: JoinHandle<PipeResult<()>>,
}

impl WorkerHandle<ConsumerState> for ConsumerWorkerHandle {
    fn state(&self) -> ConsumerState {
        *self.state_rx.borrow()
    }

    async fn wait(self) -> PipeResult<()> {
        match self.join_handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "log consumer task panicked");
                Err(pipe_error!(
                    ErrorKind::ConsumerWorkerPanic,
                    "Log consumer task panicked",
                    err.to_string(),
                    source: err
                ))
            }
        }
    }
}
