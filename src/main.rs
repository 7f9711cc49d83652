use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use scout::runtime::liveness::{spawn_status_server, LivenessProbe, PidFile};
use scout::{
    init_tracing_with, LogFormat, Relay, RelayConfig, RoutingTable, ScoutConfig, SidekiqSink,
    SqsReceiveOptions, SqsSource,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// SQS listener.
///
/// Polls the SQS queue named in the config and enqueues Sidekiq jobs with the
/// queue items. Stops gracefully on SIGTERM, after in-flight messages finish.
#[derive(Debug, Parser)]
#[command(name = "scout", version)]
struct Cli {
    /// Load config from FILE
    #[arg(long, short = 'c', value_name = "FILE")]
    config: PathBuf,

    /// Poll SQS every N milliseconds
    #[arg(
        long,
        short = 'f',
        value_name = "N",
        default_value_t = 100,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    freq: u64,

    /// Log level, overridden by RUST_LOG when set
    #[arg(long, short = 'l', value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log in JSON format
    #[arg(long, short = 'j')]
    json: bool,

    /// Serve GET /status on this address
    #[arg(long, value_name = "ADDR")]
    status_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Exit status for a rejected command line; help and version output exit cleanly.
fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(usage_exit_code(&err));
        }
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing_with(cli.log_level.directive(), format);

    tracing::info!(config = %cli.config.display(), "reading config");
    tracing::info!(interval_ms = cli.freq, "polling interval");

    let config = ScoutConfig::from_file(&cli.config)?;
    config.validate().context("invalid configuration")?;
    let routes = RoutingTable::new(config.queue.topics.clone())?;
    let relay_config = RelayConfig::builder()
        .poll_interval(Duration::from_millis(cli.freq))
        .build()?;

    let source = SqsSource::connect(&config.aws, &config.queue.name, SqsReceiveOptions::from_env())
        .await
        .context("initialization error")?;
    let sink = SidekiqSink::connect(&config.redis)
        .await
        .context("initialization error")?;

    tracing::info!(queue = %config.queue.name, "now listening on queue");
    for (topic, worker) in routes.routes() {
        tracing::info!("{topic} -> {worker}");
    }

    let working_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let pid_file = PidFile::create(PidFile::default_path(&working_dir))?;

    let status_shutdown = CancellationToken::new();
    let status_handle = match cli.status_addr {
        Some(addr) => {
            let probe = LivenessProbe::new(pid_file.path());
            let (_, handle) = spawn_status_server(addr, probe, status_shutdown.clone())?;
            Some(handle)
        }
        None => None,
    };

    let relay = Relay::new(relay_config, routes, source, sink)?;
    let outcome = relay.run_until_signal().await;

    status_shutdown.cancel();
    if let Some(handle) = status_handle {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "status endpoint exited with error"),
            Err(err) => tracing::warn!(error = %err, "status endpoint task panicked"),
        }
    }
    drop(pid_file);

    outcome
}
