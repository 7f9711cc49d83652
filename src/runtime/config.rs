use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// On-disk configuration describing where to listen and where to enqueue.
///
/// Mirrors the YAML layout:
///
/// ```yaml
/// redis:
///   host: localhost:6379
///   queue: default
///   namespace: myapp   # optional
///   password: secret   # optional
/// aws:
///   access_key: AKIA...
///   secret_key: ...
///   region: us-east-1
/// queue:
///   name: my-sqs-queue
///   topics:
///     user-created: UserCreatedWorker
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScoutConfig {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Connection parameters for the Redis instance backing Sidekiq.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub queue: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub password: String,
}

/// Static AWS credentials and region used to reach SQS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AwsConfig {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub region: String,
}

/// The SQS queue to listen on and the topic → worker class routes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub topics: HashMap<String, String>,
}

impl ScoutConfig {
    /// Reads and parses a YAML config file. Field presence is checked by [`Self::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("invalid YAML configuration")
    }

    /// Ensures every field required to start polling is present.
    pub fn validate(&self) -> Result<()> {
        ensure_not_empty(&self.queue.name, "queue.name")?;
        if self.queue.topics.is_empty() {
            bail!("queue.topics must define at least one topic");
        }
        ensure_not_empty(&self.aws.access_key, "aws.access_key")?;
        ensure_not_empty(&self.aws.secret_key, "aws.secret_key")?;
        ensure_not_empty(&self.aws.region, "aws.region")?;
        ensure_not_empty(&self.redis.host, "redis.host")?;
        ensure_not_empty(&self.redis.queue, "redis.queue")?;
        Ok(())
    }
}

impl AwsConfig {
    /// Region with `.` and `_` rewritten to `-`, so `us_west.2` becomes `us-west-2`.
    pub fn normalized_region(&self) -> String {
        self.region.trim().replace(['.', '_'], "-")
    }
}

/// Engine settings for the poll/dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    poll_interval: Duration,
    metrics_interval: Duration,
}

impl RelayConfig {
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::default()
    }

    pub fn new(poll_interval: Duration, metrics_interval: Duration) -> Result<Self> {
        let config = Self {
            poll_interval,
            metrics_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Delay between the start of consecutive fetch cycles.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            metrics_interval: telemetry::DEFAULT_METRICS_INTERVAL,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct RelayConfigBuilder {
    poll_interval: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl RelayConfigBuilder {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<RelayConfig> {
        RelayConfig::new(
            self.poll_interval
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
            self.metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        )
    }
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}
