//! Status publishing over an HTTP webhook.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;

use crate::catalog::RunStats;
use crate::lab::StatusPublisher;

/// Posts run stats as JSON to a fixed URL.
pub struct WebhookPublisher {
    client: Client,
    url: String,
}

impl WebhookPublisher {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl StatusPublisher for WebhookPublisher {
    async fn is_reachable(&self) -> bool {
        match self.client.head(&self.url).send().await {
            Ok(resp) => !resp.status().is_server_error(),
            Err(e) => {
                debug!(url = %self.url, error = %e, "Status webhook unreachable");
                false
            }
        }
    }

    async fn publish(&self, stats: &RunStats) -> Result<()> {
        self.client
            .post(&self.url)
            .json(stats)
            .send()
            .await
            .with_context(|| format!("failed to post stats to {}", self.url))?
            .error_for_status()
            .context("status webhook rejected stats")?;
        debug!(url = %self.url, passed = stats.passed, failed = stats.failed, "Published run stats");
        Ok(())
    }
}
