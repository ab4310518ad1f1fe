//! Datadog metrics and monitors client.
//!
//! Series go to `/api/v1/series`, monitors to `/api/v1/monitor`.

use super::{MetricsSink, Sample, SinkError};
use crate::config::DatadogConfig;
use crate::services::monitors::{CreatedMonitor, MonitorDefinition, MonitorThresholds};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix applied to every metric name on the wire.
pub const METRIC_PREFIX: &str = "healthbot.";

const API_KEY_HEADER: &str = "DD-API-KEY";
const APP_KEY_HEADER: &str = "DD-APPLICATION-KEY";

#[derive(Debug, Clone)]
pub struct DatadogSinkConfig {
    pub api_key: Secret<String>,
    pub app_key: Secret<String>,
    pub base_url: String,
    pub service: String,
    pub env: String,
}

impl DatadogSinkConfig {
    /// `None` unless both keys are present.
    pub fn from_config(config: &DatadogConfig) -> Option<Self> {
        match (&config.api_key, &config.app_key) {
            (Some(api_key), Some(app_key)) => Some(Self {
                api_key: api_key.clone(),
                app_key: app_key.clone(),
                base_url: config.base_url(),
                service: config.service.clone(),
                env: config.env.clone(),
            }),
            _ => None,
        }
    }
}

/// Datadog-backed sink.
#[derive(Clone)]
pub struct DatadogSink {
    client: Client,
    config: DatadogSinkConfig,
}

impl DatadogSink {
    pub fn new(config: DatadogSinkConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SinkError::Network(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Tags attached to every series and monitor.
    fn default_tags(&self) -> Vec<String> {
        vec![
            format!("service:{}", self.config.service),
            format!("env:{}", self.config.env),
            "source:healthbot".to_string(),
        ]
    }

    fn to_series(&self, sample: &Sample) -> Series {
        let mut tags = self.default_tags();
        tags.extend(sample.tags.iter().cloned());

        Series {
            metric: format!("{}{}", METRIC_PREFIX, sample.name),
            points: vec![(sample.timestamp.timestamp(), sample.value)],
            metric_type: "gauge",
            tags,
        }
    }

    async fn rejected(response: reqwest::Response) -> SinkError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        SinkError::Rejected { status, body }
    }
}

#[async_trait]
impl MetricsSink for DatadogSink {
    fn is_enabled(&self) -> bool {
        true
    }

    async fn submit(&self, samples: &[Sample]) -> Result<(), SinkError> {
        if samples.is_empty() {
            return Ok(());
        }

        let payload = SeriesPayload {
            series: samples.iter().map(|s| self.to_series(s)).collect(),
        };

        let response = self
            .client
            .post(self.url("/api/v1/series"))
            .header(API_KEY_HEADER, self.config.api_key.expose_secret().as_str())
            .json(&payload)
            .send()
            .await
            .map_err(|e| SinkError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        tracing::debug!(count = samples.len(), "Samples sent to Datadog");
        Ok(())
    }

    async fn create_monitor(
        &self,
        monitor: &MonitorDefinition,
    ) -> Result<CreatedMonitor, SinkError> {
        let request = MonitorRequest {
            name: &monitor.name,
            monitor_type: "metric alert",
            query: &monitor.query,
            message: &monitor.message,
            tags: self.default_tags(),
            options: MonitorOptions {
                thresholds: &monitor.thresholds,
                notify_no_data: monitor.notify_no_data,
                renotify_interval: monitor.renotify_interval,
            },
        };

        let response = self
            .client
            .post(self.url("/api/v1/monitor"))
            .header(API_KEY_HEADER, self.config.api_key.expose_secret().as_str())
            .header(APP_KEY_HEADER, self.config.app_key.expose_secret().as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| SinkError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let created: MonitorResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Malformed(e.to_string()))?;

        Ok(CreatedMonitor::created(created.id, &monitor.name))
    }

    fn name(&self) -> &'static str {
        "datadog"
    }
}

// ============================================================================
// Datadog API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct SeriesPayload {
    series: Vec<Series>,
}

#[derive(Debug, Serialize)]
struct Series {
    metric: String,
    points: Vec<(i64, f64)>,
    #[serde(rename = "type")]
    metric_type: &'static str,
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct MonitorRequest<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    monitor_type: &'static str,
    query: &'a str,
    message: &'a str,
    tags: Vec<String>,
    options: MonitorOptions<'a>,
}

#[derive(Debug, Serialize)]
struct MonitorOptions<'a> {
    thresholds: &'a MonitorThresholds,
    notify_no_data: bool,
    renotify_interval: u32,
}

#[derive(Debug, Deserialize)]
struct MonitorResponse {
    id: i64,
}
