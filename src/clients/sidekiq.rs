//! Sidekiq-on-Redis implementation of [`WorkerSink`].
//!
//! Jobs are written in the format Sidekiq's Ruby client produces so the
//! Ruby side can fetch them unchanged: the job hash is pushed onto
//! `queue:<name>` and the queue name is registered in the `queues` set.

use super::sink::WorkerSink;
use crate::runtime::config::RedisConfig;
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use rand::RngCore;
use redis::aio::ConnectionManager;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

const JID_BYTES: usize = 12;

/// Connection-independent description of where jobs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidekiqQueue {
    queue: String,
    namespace: Option<String>,
}

impl SidekiqQueue {
    pub fn new(queue: impl Into<String>, namespace: Option<String>) -> Result<Self> {
        let queue = queue.into().trim().to_owned();
        if queue.is_empty() {
            bail!("Sidekiq queue required");
        }
        let namespace = namespace
            .map(|namespace| namespace.trim().to_owned())
            .filter(|namespace| !namespace.is_empty());
        Ok(Self { queue, namespace })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Redis list holding pending jobs for this queue.
    pub fn list_key(&self) -> String {
        self.namespaced(&format!("queue:{}", self.queue))
    }

    /// Redis set listing every known queue.
    pub fn queues_key(&self) -> String {
        self.namespaced("queues")
    }

    fn namespaced(&self, key: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}:{key}"),
            None => key.to_owned(),
        }
    }

    /// Serializes a retryable job. A JSON `payload` is embedded as raw JSON; anything else,
    /// the empty string included, is embedded as a JSON string.
    pub fn job(&self, worker_class: &str, payload: &str, jid: &str, now: f64) -> String {
        let args = match serde_json::from_str::<Value>(payload) {
            Ok(args) => args,
            Err(_) => {
                tracing::warn!(class = worker_class, "payload is not JSON; enqueuing it as a string");
                Value::String(payload.to_owned())
            }
        };
        let job = json!({
            "queue": self.queue,
            "class": worker_class,
            "args": [args],
            "jid": jid,
            "retry": true,
            "created_at": now,
            "enqueued_at": now,
        });
        job.to_string()
    }
}

pub struct SidekiqSink {
    connection: ConnectionManager,
    target: SidekiqQueue,
}

impl SidekiqSink {
    /// Connects to the configured Redis host. `host` and `queue` are required.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let url = redis_url(config)?;
        let target = SidekiqQueue::new(config.queue.clone(), Some(config.namespace.clone()))?;

        let client = redis::Client::open(url.as_str()).context("invalid redis connection url")?;
        let connection = ConnectionManager::new(client)
            .await
            .with_context(|| format!("failed to connect to redis at {}", config.host))?;

        tracing::debug!(host = %config.host, queue = target.queue(), "connected to redis");
        Ok(Self { connection, target })
    }

    async fn enqueue(&self, worker_class: &str, payload: &str) -> Result<String> {
        let jid = generate_jid();
        let job = self.target.job(worker_class, payload, &jid, unix_now());

        let mut connection = self.connection.clone();
        redis::pipe()
            .atomic()
            .sadd(self.target.queues_key(), self.target.queue())
            .ignore()
            .lpush(self.target.list_key(), job)
            .ignore()
            .query_async::<_, ()>(&mut connection)
            .await
            .context("failed to push job to redis")?;

        Ok(jid)
    }
}

impl WorkerSink for SidekiqSink {
    fn push<'a>(&'a self, worker_class: &'a str, payload: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.enqueue(worker_class, payload))
    }
}

fn redis_url(config: &RedisConfig) -> Result<String> {
    let host = config.host.trim();
    if host.is_empty() {
        bail!("Redis host required");
    }
    if host.starts_with("redis://") || host.starts_with("rediss://") {
        return Ok(host.to_owned());
    }

    let password = config.password.trim();
    if password.is_empty() {
        Ok(format!("redis://{host}/0"))
    } else {
        Ok(format!("redis://:{password}@{host}/0"))
    }
}

fn generate_jid() -> String {
    let mut bytes = [0u8; JID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}
