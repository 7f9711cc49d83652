//! Fixed-interval poll loop.
//!
//! Cycles never overlap: each tick awaits its fetch before the next tick is
//! considered, and late ticks are delayed rather than bursted, so at most one
//! fetch is outstanding. Every fetched envelope is spawned as its own task, in
//! fetch order, after its in-flight unit is registered. Concurrency is bounded
//! only by batch size and cycle rate; there is no queue-depth limit.

use super::message::MessageProcessor;
use super::shutdown::ShutdownCoordinator;
use crate::clients::{Envelope, SourceQueue, WorkerSink};
use crate::runtime::fatal::{panic_message, FatalErrorHandler};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

pub struct Scheduler<S, W> {
    processor: MessageProcessor<S, W>,
    coordinator: ShutdownCoordinator,
    fatal_handler: FatalErrorHandler,
    poll_interval: Duration,
}

impl<S: SourceQueue, W: WorkerSink> Scheduler<S, W> {
    pub fn new(
        processor: MessageProcessor<S, W>,
        coordinator: ShutdownCoordinator,
        fatal_handler: FatalErrorHandler,
        poll_interval: Duration,
    ) -> Self {
        Self {
            processor,
            coordinator,
            fatal_handler,
            poll_interval,
        }
    }

    /// Polls until the termination signal is set.
    ///
    /// A cycle already fetching when the signal arrives finishes and dispatches its
    /// messages; no new cycle starts afterwards. Returns without waiting for the
    /// dispatched tasks, which remain tracked by the coordinator.
    pub async fn run(&self) {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(
            interval_ms = self.poll_interval.as_millis() as u64,
            "scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.coordinator.terminated() => {
                    tracing::info!("scheduler received termination signal; no new fetches");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }

    /// Runs one fetch cycle and dispatches every fetched envelope. Returns the number
    /// of envelopes dispatched. A fetch error counts as an empty batch.
    pub async fn poll_once(&self) -> usize {
        tracing::trace!("polling source queue");
        let envelopes = match self.processor.source().fetch().await {
            Ok(envelopes) => envelopes,
            Err(err) => {
                tracing::error!(error = %err, "error fetching messages");
                self.processor.telemetry().record_fetch_error();
                return 0;
            }
        };

        let count = envelopes.len();
        if count > 0 {
            tracing::debug!(count, "fetched messages");
            self.processor.telemetry().record_fetched(count as u64);
        }

        for envelope in envelopes {
            self.dispatch(envelope);
        }

        count
    }

    /// Spawns one processing task holding one in-flight unit for its whole lifetime.
    pub fn dispatch(&self, envelope: Envelope) -> JoinHandle<()> {
        let guard = self.coordinator.track();
        let processor = self.processor.clone();
        let fatal_handler = self.fatal_handler.clone();
        let message_id = envelope.id().to_owned();

        tokio::spawn(async move {
            let _guard = guard;
            let result = AssertUnwindSafe(processor.process(envelope))
                .catch_unwind()
                .await;

            if let Err(panic_payload) = result {
                let panic_msg = panic_message(panic_payload.as_ref());
                let context = format!("processing message {message_id} panicked");
                fatal_handler.trigger(
                    context.as_str(),
                    anyhow::anyhow!("{context}: {panic_msg}"),
                );
            }
        })
    }
}
