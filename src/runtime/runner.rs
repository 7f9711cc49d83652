use crate::clients::{SourceQueue, WorkerSink};
use crate::processor::message::MessageProcessor;
use crate::processor::routing::RoutingTable;
use crate::processor::scheduler::Scheduler;
use crate::processor::shutdown::{ShutdownCoordinator, ShutdownState};
use crate::runtime::config::RelayConfig;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::telemetry::{self, Telemetry};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Wires the scheduler, the per-message pipeline, and the shutdown coordinator, and
/// exposes the blocking entry points used by the host process.
pub struct Relay<S, W> {
    config: RelayConfig,
    processor: MessageProcessor<S, W>,
    routes: Arc<RoutingTable>,
    coordinator: ShutdownCoordinator,
    fatal_handler: FatalErrorHandler,
    telemetry: Arc<Telemetry>,
}

impl<S: SourceQueue, W: WorkerSink> Relay<S, W> {
    /// Creates a relay. Fails when the configuration is invalid.
    pub fn new(config: RelayConfig, routes: RoutingTable, source: S, sink: W) -> Result<Self> {
        config.validate().context("invalid relay configuration")?;

        let routes = Arc::new(routes);
        let telemetry = Arc::new(Telemetry::default());
        let coordinator = ShutdownCoordinator::new();
        let fatal_handler = FatalErrorHandler::new(coordinator.clone());
        let processor = MessageProcessor::new(
            Arc::new(source),
            Arc::new(sink),
            routes.clone(),
            telemetry.clone(),
        );

        Ok(Self {
            config,
            processor,
            routes,
            coordinator,
            fatal_handler,
            telemetry,
        })
    }

    /// Handle to the shutdown coordinator; call [`ShutdownCoordinator::terminate`] to stop.
    pub fn coordinator(&self) -> ShutdownCoordinator {
        self.coordinator.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn state(&self) -> ShutdownState {
        self.coordinator.state()
    }

    /// Polls until the termination signal is set, then waits for every in-flight message.
    ///
    /// Returns only once the coordinator reaches [`ShutdownState::Stopped`]. Fails if a
    /// processing task panicked.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            interval_ms = self.config.poll_interval().as_millis() as u64,
            routes = self.routes.len(),
            "relay started"
        );

        let reporter_token = CancellationToken::new();
        let reporter = telemetry::spawn_metrics_reporter(
            self.telemetry.clone(),
            self.coordinator.clone(),
            reporter_token.clone(),
            self.config.metrics_interval(),
        );

        let scheduler = Scheduler::new(
            self.processor.clone(),
            self.coordinator.clone(),
            self.fatal_handler.clone(),
            self.config.poll_interval(),
        );
        scheduler.run().await;

        tracing::info!(
            in_flight = self.coordinator.in_flight(),
            "waiting for in-flight messages"
        );
        self.coordinator.drain().await;

        reporter_token.cancel();
        if let Err(err) = reporter.await {
            tracing::warn!(error = %err, "metrics reporter task panicked");
        }

        let snapshot = self.telemetry.snapshot();
        tracing::info!(
            fetched = snapshot.fetched,
            enqueued = snapshot.enqueued,
            skipped = snapshot.skipped,
            retained = snapshot.retained,
            "relay stopped"
        );

        match self.fatal_handler.error() {
            Some(err) => Err(err).context("relay aborted"),
            None => Ok(()),
        }
    }

    /// Like [`Self::run`], but also sets the termination signal on SIGTERM or Ctrl-C (SIGINT).
    pub async fn run_until_signal(&self) -> Result<()> {
        let signals = TerminationSignals::install()?;
        let coordinator = self.coordinator.clone();
        let listener = tokio::spawn(async move {
            tokio::select! {
                name = signals.recv() => {
                    tracing::info!(signal = name, "received termination signal");
                    coordinator.terminate();
                }
                _ = coordinator.terminated() => {}
            }
        });

        let result = self.run().await;
        if let Err(err) = listener.await {
            tracing::warn!(error = %err, "signal listener task panicked");
        }
        result
    }
}

struct TerminationSignals {
    #[cfg(unix)]
    sigterm: signal::unix::Signal,
}

impl TerminationSignals {
    fn install() -> Result<Self> {
        #[cfg(unix)]
        {
            let sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .context("failed to install SIGTERM handler")?;
            Ok(Self { sigterm })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    async fn recv(self) -> &'static str {
        #[cfg(unix)]
        {
            let mut sigterm = self.sigterm;
            tokio::select! {
                _ = signal::ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        #[cfg(not(unix))]
        {
            let _ = signal::ctrl_c().await;
            "ctrl-c"
        }
    }
}
