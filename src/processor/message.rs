//! Per-message pipeline: decode, route, push, acknowledge.
//!
//! Poison input (undecodable bodies, missing topics) and unrouted topics are
//! acknowledged without a push so they cannot block the queue. A failed push
//! leaves the message in the source queue for redelivery.

use super::routing::{topic_name, RoutingTable};
use crate::clients::{Envelope, SourceQueue, WorkerSink};
use crate::runtime::telemetry::Telemetry;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

const TOPIC_ARN_FIELD: &str = "TopicArn";
const MESSAGE_FIELD: &str = "Message";

/// Terminal result of processing one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Pushed to the sink; deletion from the source was attempted.
    Enqueued { job_id: String },
    /// Not pushed; deletion from the source was attempted.
    Skipped(SkipReason),
    /// The push failed; the message was left in the source queue.
    Retained,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnparseableBody,
    MissingTopic,
    NoRoute { topic: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnparseableBody => write!(f, "message body could not be parsed"),
            SkipReason::MissingTopic => write!(f, "message has no {TOPIC_ARN_FIELD} string"),
            SkipReason::NoRoute { topic } => write!(f, "no worker for topic {topic}"),
        }
    }
}

/// What the pipeline decided to do with a decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Delivery {
    Push { worker_class: String, payload: String },
    Skip(SkipReason),
}

pub struct MessageProcessor<S, W> {
    source: Arc<S>,
    sink: Arc<W>,
    routes: Arc<RoutingTable>,
    telemetry: Arc<Telemetry>,
}

impl<S, W> Clone for MessageProcessor<S, W> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            sink: Arc::clone(&self.sink),
            routes: Arc::clone(&self.routes),
            telemetry: Arc::clone(&self.telemetry),
        }
    }
}

impl<S: SourceQueue, W: WorkerSink> MessageProcessor<S, W> {
    pub fn new(
        source: Arc<S>,
        sink: Arc<W>,
        routes: Arc<RoutingTable>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            source,
            sink,
            routes,
            telemetry,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Runs the full pipeline for one envelope. Never fails; every error is logged and
    /// reflected in the returned [`Outcome`].
    pub async fn process(&self, envelope: Envelope) -> Outcome {
        let span = tracing::info_span!("message", message_id = envelope.id());
        self.process_inner(envelope).instrument(span).await
    }

    async fn process_inner(&self, envelope: Envelope) -> Outcome {
        tracing::debug!("processing message");

        match plan_delivery(&self.routes, envelope.body()) {
            Delivery::Skip(reason) => {
                tracing::warn!(reason = %reason, "skipping message");
                self.telemetry.record_skipped();
                self.acknowledge(&envelope).await;
                Outcome::Skipped(reason)
            }
            Delivery::Push {
                worker_class,
                payload,
            } => match self.sink.push(&worker_class, &payload).await {
                Ok(job_id) => {
                    tracing::info!(
                        class = %worker_class,
                        job_id = %job_id,
                        args = %payload,
                        "enqueued job"
                    );
                    self.telemetry.record_enqueued();
                    self.acknowledge(&envelope).await;
                    Outcome::Enqueued { job_id }
                }
                Err(err) => {
                    tracing::error!(
                        class = %worker_class,
                        error = %err,
                        "couldn't enqueue worker; leaving message for redelivery"
                    );
                    self.telemetry.record_retained();
                    Outcome::Retained
                }
            },
        }
    }

    async fn acknowledge(&self, envelope: &Envelope) {
        match self.source.delete(envelope.ack_handle()).await {
            Ok(()) => tracing::info!("deleted message"),
            Err(err) => {
                tracing::error!(error = %err, "couldn't delete message");
                self.telemetry.record_delete_error();
            }
        }
    }
}

/// Decodes a body and decides whether and where it should be pushed.
pub(crate) fn plan_delivery(routes: &RoutingTable, body: &[u8]) -> Delivery {
    let fields = match serde_json::from_slice::<Map<String, Value>>(body) {
        Ok(fields) => fields,
        Err(err) => {
            tracing::warn!(error = %err, "message body could not be parsed");
            return Delivery::Skip(SkipReason::UnparseableBody);
        }
    };

    let Some(topic_arn) = fields.get(TOPIC_ARN_FIELD).and_then(Value::as_str) else {
        return Delivery::Skip(SkipReason::MissingTopic);
    };

    let Some(worker_class) = routes.resolve(topic_arn) else {
        return Delivery::Skip(SkipReason::NoRoute {
            topic: topic_name(topic_arn).to_owned(),
        });
    };

    Delivery::Push {
        worker_class: worker_class.to_owned(),
        payload: forward_payload(&fields),
    }
}

/// Extracts the payload to forward.
///
/// Best effort: a non-string `Message` is forwarded as its compact JSON text and a missing
/// one as the empty string, each with a warning. Delivery is still attempted.
pub(crate) fn forward_payload(fields: &Map<String, Value>) -> String {
    match fields.get(MESSAGE_FIELD) {
        Some(Value::String(payload)) => payload.clone(),
        Some(other) => {
            tracing::warn!(
                kind = json_kind(other),
                "{MESSAGE_FIELD} is not a string; forwarding its JSON text"
            );
            other.to_string()
        }
        None => {
            tracing::warn!("message has no {MESSAGE_FIELD} field; forwarding an empty payload");
            String::new()
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
