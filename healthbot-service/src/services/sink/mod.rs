//! External metrics sink.
//!
//! Samples and monitor definitions leave the process through a `MetricsSink`.
//! Datadog is the production backend; without credentials the service runs
//! against `DisabledSink` and every sample ends up in the local buffer.

pub mod datadog;
pub mod mock;

use crate::services::monitors::{CreatedMonitor, MonitorDefinition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub use datadog::{DatadogSink, DatadogSinkConfig};
pub use mock::MockSink;

/// One named observation destined for the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(name: impl Into<String>, value: f64, tags: Vec<String>) -> Self {
        Self {
            name: name.into(),
            value,
            tags,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink not configured")]
    NotConfigured,

    #[error("Sink rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed sink response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Whether the sink has the credentials it needs.
    fn is_enabled(&self) -> bool;

    /// Deliver a batch of samples in a single call.
    async fn submit(&self, samples: &[Sample]) -> Result<(), SinkError>;

    /// Create a remote alert rule.
    async fn create_monitor(
        &self,
        monitor: &MonitorDefinition,
    ) -> Result<CreatedMonitor, SinkError>;

    fn name(&self) -> &'static str;
}

/// Stand-in used when credentials are missing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSink;

#[async_trait]
impl MetricsSink for DisabledSink {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn submit(&self, _samples: &[Sample]) -> Result<(), SinkError> {
        Err(SinkError::NotConfigured)
    }

    async fn create_monitor(
        &self,
        _monitor: &MonitorDefinition,
    ) -> Result<CreatedMonitor, SinkError> {
        Err(SinkError::NotConfigured)
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}
