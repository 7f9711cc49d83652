use bytes::Bytes;

/// One fetched unit of work from the source queue.
///
/// The `ack_handle` is opaque to the relay and is handed back unchanged to
/// [`SourceQueue::delete`](super::SourceQueue::delete) when the message is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    id: String,
    body: Bytes,
    ack_handle: String,
}

impl Envelope {
    pub fn new(
        id: impl Into<String>,
        body: impl Into<Bytes>,
        ack_handle: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            ack_handle: ack_handle.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn ack_handle(&self) -> &str {
        &self.ack_handle
    }
}
