use crate::support::{
    helpers::{init_tracing, processor},
    mock_clients::{mock_message, raw_message, receipt, MockSink, MockSource},
};
use scout::{Outcome, SkipReason};
use serde_json::json;

#[tokio::test]
async fn routed_message_is_pushed_then_deleted() {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::new();
    let (processor, telemetry) = processor(&source, &sink);

    let outcome = processor
        .process(mock_message("1", r#"{"foo":"bar"}"#, "topicA"))
        .await;

    assert_eq!(
        outcome,
        Outcome::Enqueued {
            job_id: "jid-1".into()
        }
    );
    assert_eq!(
        sink.pushed(),
        vec![("WorkerA".to_string(), r#"{"foo":"bar"}"#.to_string())]
    );
    assert_eq!(source.deleted(), vec![receipt("1")]);
    assert_eq!(telemetry.snapshot().enqueued, 1);
}

#[tokio::test]
async fn full_arn_routes_by_last_segment() {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::new();
    let (processor, _) = processor(&source, &sink);

    processor
        .process(mock_message(
            "1",
            r#"{"key":"val"}"#,
            "arn:aws:sns:us-west-2:123456789012:topicB",
        ))
        .await;

    assert_eq!(
        sink.pushed(),
        vec![("WorkerB".to_string(), r#"{"key":"val"}"#.to_string())]
    );
    assert_eq!(source.deleted(), vec![receipt("1")]);
}

#[tokio::test]
async fn malformed_bodies_are_deleted_without_push() {
    init_tracing();
    for (idx, body) in ["thisain'tjson", "[1,2]", "", "{\"TopicArn\":"]
        .into_iter()
        .enumerate()
    {
        let source = MockSource::new();
        let sink = MockSink::new();
        let (processor, telemetry) = processor(&source, &sink);
        let id = idx.to_string();

        let outcome = processor.process(raw_message(&id, body)).await;

        assert_eq!(outcome, Outcome::Skipped(SkipReason::UnparseableBody));
        assert!(sink.pushed().is_empty(), "body {body:?} must not be pushed");
        assert_eq!(source.deleted(), vec![receipt(&id)]);
        assert_eq!(telemetry.snapshot().skipped, 1);
    }
}

#[tokio::test]
async fn missing_topic_is_deleted_without_push() {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::new();
    let (processor, _) = processor(&source, &sink);

    let body = json!({"Message": "{}", "TopicArn": ["topicA"]}).to_string();
    let outcome = processor.process(raw_message("1", &body)).await;

    assert_eq!(outcome, Outcome::Skipped(SkipReason::MissingTopic));
    assert!(sink.pushed().is_empty());
    assert_eq!(source.deleted(), vec![receipt("1")]);
}

#[tokio::test]
async fn unrouted_topic_is_deleted_without_push() {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::new();
    let (processor, _) = processor(&source, &sink);

    let outcome = processor
        .process(mock_message("1", r#"{"foo":"bar"}"#, "topicC"))
        .await;

    assert_eq!(
        outcome,
        Outcome::Skipped(SkipReason::NoRoute {
            topic: "topicC".into()
        })
    );
    assert!(sink.pushed().is_empty());
    assert_eq!(source.deleted(), vec![receipt("1")]);
}

#[tokio::test]
async fn push_failure_retains_message() {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::failing("oops");
    let (processor, telemetry) = processor(&source, &sink);

    let outcome = processor
        .process(mock_message("1", r#"{"foo":"bar"}"#, "topicA"))
        .await;

    assert_eq!(outcome, Outcome::Retained);
    assert_eq!(sink.pushed().len(), 1);
    assert!(source.deleted().is_empty());
    assert_eq!(telemetry.snapshot().retained, 1);
}

#[tokio::test]
async fn redelivery_after_push_failure_is_a_fresh_run() {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::failing("redis down");
    let (processor, _) = processor(&source, &sink);
    let message = mock_message("1", r#"{"foo":"bar"}"#, "topicA");

    assert_eq!(processor.process(message.clone()).await, Outcome::Retained);
    assert!(source.deleted().is_empty());

    sink.set_push_error(None);
    let outcome = processor.process(message).await;

    assert!(matches!(outcome, Outcome::Enqueued { .. }));
    assert_eq!(sink.pushed().len(), 2, "each run pushes once");
    assert_eq!(source.deleted(), vec![receipt("1")]);
}

#[tokio::test]
async fn delete_failure_is_logged_not_retried() {
    init_tracing();
    let source = MockSource::new();
    source.fail_deletes("throttled");
    let sink = MockSink::new();
    let (processor, telemetry) = processor(&source, &sink);

    let outcome = processor
        .process(mock_message("1", r#"{"foo":"bar"}"#, "topicA"))
        .await;

    assert!(matches!(outcome, Outcome::Enqueued { .. }));
    assert_eq!(source.deleted().len(), 1, "delete is attempted exactly once");
    assert_eq!(telemetry.snapshot().delete_errors, 1);
}

#[tokio::test]
async fn non_string_payload_is_delivered_best_effort() {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::new();
    let (processor, _) = processor(&source, &sink);

    let body = json!({"TopicArn": "topicA", "Message": {"foo": "bar"}}).to_string();
    let outcome = processor.process(raw_message("1", &body)).await;

    assert!(matches!(outcome, Outcome::Enqueued { .. }));
    assert_eq!(
        sink.pushed(),
        vec![("WorkerA".to_string(), r#"{"foo":"bar"}"#.to_string())]
    );
    assert_eq!(source.deleted(), vec![receipt("1")]);
}

#[tokio::test]
async fn missing_payload_is_delivered_empty() {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::new();
    let (processor, _) = processor(&source, &sink);

    let body = json!({"TopicArn": "topicB"}).to_string();
    processor.process(raw_message("1", &body)).await;

    assert_eq!(sink.pushed(), vec![("WorkerB".to_string(), String::new())]);
    assert_eq!(source.deleted(), vec![receipt("1")]);
}

#[tokio::test]
async fn complex_body_with_extra_fields_is_enqueued() {
    init_tracing();
    let source = MockSource::new();
    let sink = MockSink::new();
    let (processor, _) = processor(&source, &sink);

    let body = json!({
        "Message": r#"{"foo":"bar"}"#,
        "TopicArn": "topicA",
        "Some": {"other": "data"},
    })
    .to_string();
    processor.process(raw_message("1", &body)).await;

    assert_eq!(
        sink.pushed(),
        vec![("WorkerA".to_string(), r#"{"foo":"bar"}"#.to_string())]
    );
    assert_eq!(source.deleted(), vec![receipt("1")]);
}
