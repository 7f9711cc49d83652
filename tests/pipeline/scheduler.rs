use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, scheduler, terminate_and_drain, within},
    mock_clients::{mock_message, raw_message, receipt, MockSink, MockSource},
};
use anyhow::Result;
use scout::ShutdownState;
use tokio::time::sleep;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_is_routed_pushed_and_deleted() -> Result<()> {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::new();
    source.push_batch(vec![
        mock_message("1", r#"{"foo":"bar"}"#, "topicA"),
        mock_message("3", r#"{"key":"val"}"#, "topicB"),
        mock_message("2", r#"{"bar":"baz"}"#, "topicA"),
    ]);
    let harness = scheduler(&source, &sink, Duration::from_millis(10));

    assert_eq!(harness.scheduler.poll_once().await, 3);
    terminate_and_drain(&harness.coordinator).await?;

    let pushed = sink.pushed();
    assert_eq!(pushed.len(), 3);
    for expected in [
        ("WorkerA", r#"{"foo":"bar"}"#),
        ("WorkerA", r#"{"bar":"baz"}"#),
        ("WorkerB", r#"{"key":"val"}"#),
    ] {
        assert!(
            pushed.contains(&(expected.0.to_string(), expected.1.to_string())),
            "missing push {expected:?} in {pushed:?}"
        );
    }

    let mut deleted = source.deleted();
    deleted.sort();
    assert_eq!(deleted, vec![receipt("1"), receipt("2"), receipt("3")]);
    assert_eq!(harness.coordinator.in_flight(), 0);
    assert_eq!(harness.telemetry.snapshot().fetched, 3);
    Ok(())
}

#[tokio::test]
async fn batch_is_dispatched_in_fetch_order() -> Result<()> {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::new();
    source.push_batch(vec![
        mock_message("1", r#"{"foo":"bar"}"#, "topicA"),
        mock_message("3", r#"{"key":"val"}"#, "topicB"),
        mock_message("2", r#"{"bar":"baz"}"#, "topicA"),
    ]);
    let harness = scheduler(&source, &sink, Duration::from_millis(10));

    assert_eq!(harness.scheduler.poll_once().await, 3);
    terminate_and_drain(&harness.coordinator).await?;

    assert_eq!(
        sink.pushed(),
        vec![
            ("WorkerA".to_string(), r#"{"foo":"bar"}"#.to_string()),
            ("WorkerB".to_string(), r#"{"key":"val"}"#.to_string()),
            ("WorkerA".to_string(), r#"{"bar":"baz"}"#.to_string()),
        ]
    );
    assert_eq!(
        source.deleted(),
        vec![receipt("1"), receipt("3"), receipt("2")]
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_batch_skips_poison_and_unrouted() -> Result<()> {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::new();
    source.push_batch(vec![
        mock_message("1", r#"{"foo":"bar"}"#, "topicA"),
        raw_message("bad", "thisain'tjson"),
        mock_message("2", r#"{"bar":"baz"}"#, "topicC"),
    ]);
    let harness = scheduler(&source, &sink, Duration::from_millis(10));

    harness.scheduler.poll_once().await;
    terminate_and_drain(&harness.coordinator).await?;

    assert_eq!(
        sink.pushed(),
        vec![("WorkerA".to_string(), r#"{"foo":"bar"}"#.to_string())]
    );
    let mut deleted = source.deleted();
    deleted.sort();
    assert_eq!(deleted, vec![receipt("1"), receipt("2"), receipt("bad")]);

    let snapshot = harness.telemetry.snapshot();
    assert_eq!(snapshot.enqueued, 1);
    assert_eq!(snapshot.skipped, 2);
    Ok(())
}

#[tokio::test]
async fn fetch_error_yields_empty_cycle_and_next_cycle_retries() -> Result<()> {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::new();
    source.push_fetch_error("connection reset");
    source.push_batch(vec![mock_message("1", r#"{"foo":"bar"}"#, "topicA")]);
    let harness = scheduler(&source, &sink, Duration::from_millis(10));

    assert_eq!(harness.scheduler.poll_once().await, 0);
    assert_eq!(harness.telemetry.snapshot().fetch_errors, 1);

    assert_eq!(harness.scheduler.poll_once().await, 1);
    terminate_and_drain(&harness.coordinator).await?;

    assert_eq!(sink.pushed().len(), 1);
    assert_eq!(source.deleted(), vec![receipt("1")]);
    Ok(())
}

#[tokio::test]
async fn dispatch_registers_in_flight_before_processing() -> Result<()> {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::gated();
    let harness = scheduler(&source, &sink, Duration::from_millis(10));

    let handle = harness
        .scheduler
        .dispatch(mock_message("1", r#"{"foo":"bar"}"#, "topicA"));
    assert_eq!(harness.coordinator.in_flight(), 1);

    within(Duration::from_secs(1), sink.wait_for_push_started()).await?;
    assert_eq!(harness.coordinator.in_flight(), 1);

    sink.release(1);
    within(Duration::from_secs(1), handle).await??;
    assert_eq!(harness.coordinator.in_flight(), 0);
    assert_eq!(source.deleted(), vec![receipt("1")]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_stops_polling_after_termination() -> Result<()> {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::new();
    let harness = scheduler(&source, &sink, Duration::from_millis(10));

    let coordinator = harness.coordinator.clone();
    let stopper = tokio::spawn(async move {
        sleep(Duration::from_millis(60)).await;
        coordinator.terminate();
    });

    within(Duration::from_secs(2), harness.scheduler.run()).await?;
    stopper.await?;

    let calls = source.fetch_calls();
    assert!(calls >= 2, "expected several polls, got {calls}");

    sleep(Duration::from_millis(50)).await;
    assert_eq!(source.fetch_calls(), calls, "no fetch after termination");
    assert_eq!(harness.coordinator.state(), ShutdownState::Draining);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_fetches_never_overlap() -> Result<()> {
    init_tracing();
    let source = MockSource::with_fetch_delay(Duration::from_millis(30));
    let sink = MockSink::new();
    let harness = scheduler(&source, &sink, Duration::from_millis(5));

    let coordinator = harness.coordinator.clone();
    let stopper = tokio::spawn(async move {
        sleep(Duration::from_millis(200)).await;
        coordinator.terminate();
    });

    within(Duration::from_secs(2), harness.scheduler.run()).await?;
    stopper.await?;

    assert!(source.fetch_calls() >= 2);
    assert_eq!(source.max_concurrent_fetches(), 1);
    Ok(())
}
