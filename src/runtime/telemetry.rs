use crate::processor::shutdown::ShutdownCoordinator;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Installs a tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to
/// `default_directive`. Calling this function multiple times is harmless.
pub fn init_tracing_with(default_directive: &str, format: LogFormat) {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    let _ = TRACING_INIT.set(());
}

/// Rolling counters describing relay throughput and failures.
#[derive(Default, Debug)]
pub struct Telemetry {
    fetched: AtomicU64,
    enqueued: AtomicU64,
    skipped: AtomicU64,
    retained: AtomicU64,
    fetch_errors: AtomicU64,
    delete_errors: AtomicU64,
}

impl Telemetry {
    pub fn record_fetched(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.fetched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retained(&self) {
        self.retained.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete_error(&self) {
        self.delete_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            fetched: self.fetched.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retained: self.retained.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            delete_errors: self.delete_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub fetched: u64,
    pub enqueued: u64,
    pub skipped: u64,
    pub retained: u64,
    pub fetch_errors: u64,
    pub delete_errors: u64,
}

impl TelemetrySnapshot {
    /// Messages that reached a terminal outcome.
    pub fn completed(&self) -> u64 {
        self.enqueued + self.skipped + self.retained
    }
}

/// Spawns a background task that periodically logs counters and the in-flight count.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    coordinator: ShutdownCoordinator,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        let mut last_snapshot = telemetry.snapshot();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(target: "scout::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    tracing::info!(
                        target: "scout::metrics",
                        fetched = current.fetched,
                        fetched_delta = current.fetched.saturating_sub(last_snapshot.fetched),
                        enqueued = current.enqueued,
                        skipped = current.skipped,
                        retained = current.retained,
                        fetch_errors = current.fetch_errors,
                        delete_errors = current.delete_errors,
                        in_flight = coordinator.in_flight(),
                        "relay metrics snapshot"
                    );
                    last_snapshot = current;
                }
            }
        }
    })
}
