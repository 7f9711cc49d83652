//! Collaborator capabilities consumed by the relay core: the source queue that
//! hands out envelopes and the worker sink that accepts jobs, plus their SQS
//! and Sidekiq implementations.

pub mod envelope;
pub mod sidekiq;
pub mod sink;
pub mod source;
pub mod sqs;

pub use envelope::Envelope;
pub use sidekiq::SidekiqSink;
pub use sink::WorkerSink;
pub use source::SourceQueue;
pub use sqs::{SqsReceiveOptions, SqsSource};
