use anyhow::Result;
use futures::future::BoxFuture;

/// Destination for routed payloads.
pub trait WorkerSink: Send + Sync + 'static {
    /// Enqueues `payload` for `worker_class` and returns the job id assigned by the sink.
    fn push<'a>(&'a self, worker_class: &'a str, payload: &'a str) -> BoxFuture<'a, Result<String>>;
}
