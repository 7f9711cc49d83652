//! Amazon SQS implementation of [`SourceQueue`].

use super::envelope::Envelope;
use super::source::SourceQueue;
use crate::runtime::config::AwsConfig;
use anyhow::{Context, Result};
use aws_sdk_sqs::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_sqs::Client;
use futures::future::BoxFuture;
use std::env;

pub const MAX_NUMBER_OF_MESSAGES_ENV: &str = "SCOUT_SQS_MAX_NUMBER_OF_MESSAGES";
pub const WAIT_TIME_SECONDS_ENV: &str = "SCOUT_SQS_WAIT_TIME_SECONDS";
pub const VISIBILITY_TIMEOUT_ENV: &str = "SCOUT_SQS_VISIBILITY_TIMEOUT";

const DEFAULT_MAX_NUMBER_OF_MESSAGES: i32 = 10;
const DEFAULT_WAIT_TIME_SECONDS: i32 = 20;

/// Parameters of each ReceiveMessage call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqsReceiveOptions {
    pub max_number_of_messages: i32,
    pub wait_time_seconds: i32,
    pub visibility_timeout: Option<i32>,
}

impl Default for SqsReceiveOptions {
    fn default() -> Self {
        Self {
            max_number_of_messages: DEFAULT_MAX_NUMBER_OF_MESSAGES,
            wait_time_seconds: DEFAULT_WAIT_TIME_SECONDS,
            visibility_timeout: None,
        }
    }
}

impl SqsReceiveOptions {
    /// Reads the `SCOUT_SQS_*` overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup`. Missing, unparseable, or zero values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str| {
            lookup(key)
                .and_then(|value| value.trim().parse::<i32>().ok())
                .filter(|value| *value != 0)
        };

        let defaults = Self::default();
        Self {
            max_number_of_messages: parse(MAX_NUMBER_OF_MESSAGES_ENV)
                .unwrap_or(defaults.max_number_of_messages),
            wait_time_seconds: parse(WAIT_TIME_SECONDS_ENV).unwrap_or(defaults.wait_time_seconds),
            visibility_timeout: parse(VISIBILITY_TIMEOUT_ENV).or(defaults.visibility_timeout),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqsSource {
    client: Client,
    queue_url: String,
    options: SqsReceiveOptions,
}

impl SqsSource {
    /// Builds a client from static credentials and resolves the URL of `queue_name`.
    pub async fn connect(
        aws: &AwsConfig,
        queue_name: &str,
        options: SqsReceiveOptions,
    ) -> Result<Self> {
        let credentials = Credentials::new(
            aws.access_key.trim(),
            aws.secret_key.trim(),
            None,
            None,
            "scout-static",
        );
        let config = aws_sdk_sqs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(aws.normalized_region()))
            .credentials_provider(credentials)
            .build();
        let client = Client::from_conf(config);

        let response = client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .with_context(|| format!("failed to resolve SQS queue url for {queue_name}"))?;
        let queue_url = response
            .queue_url()
            .with_context(|| format!("SQS returned no url for queue {queue_name}"))?
            .to_owned();

        tracing::debug!(queue = queue_name, url = %queue_url, "resolved SQS queue url");

        Ok(Self {
            client,
            queue_url,
            options,
        })
    }

    async fn receive(&self) -> Result<Vec<Envelope>> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(self.options.max_number_of_messages)
            .wait_time_seconds(self.options.wait_time_seconds)
            .set_visibility_timeout(self.options.visibility_timeout)
            .send()
            .await
            .context("SQS ReceiveMessage failed")?;

        let envelopes = response
            .messages()
            .iter()
            .map(|message| {
                Envelope::new(
                    message.message_id().unwrap_or_default(),
                    message.body().unwrap_or_default().to_owned(),
                    message.receipt_handle().unwrap_or_default(),
                )
            })
            .collect();

        Ok(envelopes)
    }

    async fn delete_message(&self, ack_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(ack_handle)
            .send()
            .await
            .context("SQS DeleteMessage failed")?;
        Ok(())
    }
}

impl SourceQueue for SqsSource {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<Envelope>>> {
        Box::pin(self.receive())
    }

    fn delete<'a>(&'a self, ack_handle: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.delete_message(ack_handle))
    }
}
