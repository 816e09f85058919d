// InfluxDB feed adapter - Polls the latest value of every channel
use crate::application::feed::{FeedAdapter, FeedSink, FeedStatus, FeedUpdate};
use crate::domain::channel::Channel;
use crate::infrastructure::config::{InfluxSettings, prepare_query};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct InfluxFeed {
    host: String,
    token: String,
    database: String,
    retention_policy: String,
    query_template: String,
    poll_interval: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    columns: Vec<String>,
    values: Vec<Vec<serde_json::Value>>,
}

impl InfluxFeed {
    pub fn new(settings: &InfluxSettings) -> Self {
        Self {
            host: settings.host.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            database: settings.database.clone(),
            retention_policy: settings.retention_policy.clone(),
            query_template: settings.query.clone(),
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            client: reqwest::Client::new(),
        }
    }

    fn build_query_url(&self, query: &str) -> String {
        let encoded_query = urlencoding::encode(query);
        format!(
            "{}/query?db={}&rp={}&q={}",
            self.host, self.database, self.retention_policy, encoded_query
        )
    }

    fn channel_query(&self, channel: Channel) -> String {
        let mut vars = HashMap::new();
        vars.insert("channel".to_string(), channel.id().to_string());
        prepare_query(&self.query_template, &vars)
    }

    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse> {
        let url = self.build_query_url(query);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to send request to InfluxDB")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("InfluxDB query failed with status {}: {}", status, body);
        }

        let data = response
            .json::<InfluxQLResponse>()
            .await
            .context("Failed to parse InfluxDB response")?;

        if let Some(error) = data.results.first().and_then(|r| r.error.as_ref()) {
            anyhow::bail!("InfluxDB query error: {}", error);
        }

        Ok(data)
    }

    /// Latest value of every channel; channels without data are left out
    async fn poll_once(&self) -> Result<FeedUpdate> {
        let mut values = Vec::new();
        for channel in Channel::ALL {
            let response = self.execute_query(&self.channel_query(channel)).await?;
            if let Some(value) = single_value(&response) {
                values.push((channel, value));
            }
        }
        Ok(FeedUpdate::new(values))
    }
}

/// First numeric value of the first series, preferring aggregate columns
fn single_value(response: &InfluxQLResponse) -> Option<f64> {
    let series = response.results.first()?.series.as_ref()?.first()?;
    let row = series.values.first()?;
    let value_idx = series
        .columns
        .iter()
        .position(|c| c == "last" || c == "mean" || c == "value")
        .unwrap_or(1);
    row.get(value_idx)?.as_f64()
}

#[async_trait]
impl FeedAdapter for InfluxFeed {
    fn name(&self) -> &str {
        "influxdb"
    }

    async fn run(&self, sink: FeedSink) -> Result<()> {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut connected = false;

        if !sink.status(FeedStatus::Connecting).await {
            return Ok(());
        }

        loop {
            interval.tick().await;

            let delivered = match self.poll_once().await {
                Ok(update) => {
                    if !connected {
                        connected = true;
                        tracing::info!("InfluxDB feed connected at {}", self.host);
                        sink.status(FeedStatus::Connected).await;
                    }
                    update.is_empty() || sink.update(update).await
                }
                Err(e) => {
                    tracing::warn!("InfluxDB poll failed: {:#}", e);
                    connected = false;
                    sink.status(FeedStatus::Failed(format!("{:#}", e))).await
                }
            };

            if !delivered {
                tracing::debug!("Feed sink closed, stopping InfluxDB feed");
                return Ok(());
            }
        }
    }
}
