use anyhow::{bail, Result};
use std::collections::HashMap;

/// Immutable topic name → worker class mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    routes: HashMap<String, String>,
}

impl RoutingTable {
    /// Builds the table. Fails when no routes are defined.
    pub fn new<I, K, V>(routes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let routes: HashMap<String, String> = routes
            .into_iter()
            .map(|(topic, worker)| (topic.into(), worker.into()))
            .collect();

        if routes.is_empty() {
            bail!("No topics defined");
        }

        Ok(Self { routes })
    }

    /// Looks up the worker class for a topic ARN or bare topic name.
    ///
    /// Matching is exact and case-sensitive against [`topic_name`]; there is no default route.
    pub fn resolve(&self, topic_arn: &str) -> Option<&str> {
        self.routes.get(topic_name(topic_arn)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes sorted by topic, for stable startup logging.
    pub fn routes(&self) -> Vec<(&str, &str)> {
        let mut routes: Vec<_> = self
            .routes
            .iter()
            .map(|(topic, worker)| (topic.as_str(), worker.as_str()))
            .collect();
        routes.sort_unstable();
        routes
    }
}

/// Last `:`-separated segment of an SNS topic ARN.
pub fn topic_name(topic_arn: &str) -> &str {
    topic_arn.rsplit(':').next().unwrap_or(topic_arn)
}
