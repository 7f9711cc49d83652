use super::envelope::Envelope;
use anyhow::Result;
use futures::future::BoxFuture;

/// Source of pending messages.
///
/// Implementations must be safe to share across the scheduler and every
/// in-flight processing task.
pub trait SourceQueue: Send + Sync + 'static {
    /// Fetches the next batch of pending envelopes. An empty batch is not an error.
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Envelope>>>;

    /// Acknowledges a message so it is not redelivered.
    fn delete<'a>(&'a self, ack_handle: &'a str) -> BoxFuture<'a, Result<()>>;
}
