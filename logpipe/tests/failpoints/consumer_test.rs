use logpipe::consumer::{BatchOutcome, LogConsumer, TickOutcome};
use logpipe::error::ErrorKind;
use logpipe::failpoints::{CONSUMER_BEFORE_ACKNOWLEDGE, CONSUMER_BEFORE_SINK_WRITE};
use logpipe::log::LogClient;
use logpipe::log::memory::{LogOperation, MemoryLog};
use logpipe::sink::memory::MemorySink;
use logpipe::test_utils::event::{create_log_event, encoded_payload, message_sequences};
use logpipe::test_utils::failpoints::CustomFailScenario;
use logpipe_config::shared::{ConsumerConfig, StreamConfig};
use logpipe_telemetry::tracing::init_test_tracing;

fn consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        batch_size: 10,
        max_concurrent_batches: 3,
        poll_interval_ms: 10,
    }
}

async fn append_events(log: &MemoryLog, stream: &StreamConfig, count: u64) {
    log.ensure_group(&stream.name, &stream.group).await.unwrap();
    for i in 1..=count {
        log.append(&stream.name, encoded_payload(&create_log_event(i)))
            .await
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_between_write_and_acknowledgment_replays_the_batch() {
    init_test_tracing();

    // The third batch is written but the process dies before acknowledging it.
    let scenario = CustomFailScenario::setup(&[(CONSUMER_BEFORE_ACKNOWLEDGE, "2*off->return")]);

    let stream = StreamConfig::default();
    let log = MemoryLog::new();
    let sink = MemorySink::new();
    append_events(&log, &stream, 30).await;

    let consumer =
        LogConsumer::new(stream.clone(), consumer_config(), log.clone(), sink.clone()).unwrap();
    for _ in 0..2 {
        assert!(matches!(
            consumer.tick().await.unwrap(),
            TickOutcome::PolledNew(BatchOutcome {
                persisted: 10,
                acknowledged: 10,
                ..
            })
        ));
    }

    let err = consumer.tick().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailpointTriggered);
    assert_eq!(sink.events().await.len(), 30);
    assert_eq!(log.pending_ids(&stream.name, &stream.group).await.len(), 10);
    assert_eq!(log.calls(LogOperation::Acknowledge).await, 20);
    drop(consumer);

    scenario.teardown();

    // We restart with the same consumer name, the third batch is written a second time.
    let restarted =
        LogConsumer::new(stream.clone(), consumer_config(), log.clone(), sink.clone()).unwrap();
    assert_eq!(
        restarted.tick().await.unwrap(),
        TickOutcome::DrainedPending(BatchOutcome {
            persisted: 10,
            acknowledged: 10,
            decode_failures: 0,
            ack_failures: 0,
        })
    );
    assert_eq!(restarted.tick().await.unwrap(), TickOutcome::NoRecords);

    let mut expected: Vec<u64> = (1..=30).collect();
    expected.extend(21..=30);
    assert_eq!(message_sequences(&sink.events().await), expected);
    assert!(log.pending_ids(&stream.name, &stream.group).await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_before_the_sink_write_leaves_everything_pending() {
    init_test_tracing();

    let scenario = CustomFailScenario::setup(&[(CONSUMER_BEFORE_SINK_WRITE, "return")]);

    let stream = StreamConfig::default();
    let log = MemoryLog::new();
    let sink = MemorySink::new();
    append_events(&log, &stream, 5).await;

    let consumer =
        LogConsumer::new(stream.clone(), consumer_config(), log.clone(), sink.clone()).unwrap();
    let err = consumer.tick().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailpointTriggered);
    assert!(sink.events().await.is_empty());
    assert_eq!(log.pending_ids(&stream.name, &stream.group).await.len(), 5);
    assert_eq!(consumer.gate().in_flight(), 0);

    scenario.teardown();

    assert!(matches!(
        consumer.tick().await.unwrap(),
        TickOutcome::DrainedPending(BatchOutcome { persisted: 5, .. })
    ));
    assert_eq!(message_sequences(&sink.events().await), vec![1, 2, 3, 4, 5]);
}
