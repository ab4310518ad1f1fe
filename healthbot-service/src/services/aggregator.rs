//! In-process request statistics.
//!
//! `MetricsAggregator` counts tracked chat requests, keeps a bounded history
//! of response times and forwards every observation to the configured
//! `MetricsSink`. Samples the sink does not accept are kept in a local buffer.

use crate::services::alerts::{self, Alert};
use crate::services::metrics;
use crate::services::sink::{MetricsSink, Sample};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// One completed attempt to answer a chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedRequest {
    pub response_time_ms: f64,
    pub tokens_used: u64,
    pub success: bool,
    pub error_kind: Option<String>,
}

impl TrackedRequest {
    pub fn success(response_time_ms: f64, tokens_used: u64) -> Self {
        Self {
            response_time_ms,
            tokens_used,
            success: true,
            error_kind: None,
        }
    }

    pub fn failure(response_time_ms: f64, error_kind: impl Into<String>) -> Self {
        Self {
            response_time_ms,
            tokens_used: 0,
            success: false,
            error_kind: Some(error_kind.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferReason {
    SinkDisabled,
    Rejected(String),
    TimedOut,
}

/// What happened to the samples produced by one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Buffered { reason: BufferReason, count: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: f64,
    pub total_tokens_used: u64,
    pub uptime_seconds: f64,
    pub error_rate_percent: f64,
    pub buffered_metrics: usize,
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub history_capacity: usize,
    pub sink_timeout: Duration,
    pub service: String,
    pub env: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            sink_timeout: Duration::from_millis(2000),
            service: "healthbot-monitor".to_string(),
            env: "development".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct AggregatorState {
    request_count: u64,
    error_count: u64,
    total_tokens: u64,
    response_times: VecDeque<f64>,
    total_response_time_ms: f64,
    pending_samples: Vec<Sample>,
}

impl AggregatorState {
    fn error_rate(&self) -> f64 {
        if self.request_count == 0 {
            0.0
        } else {
            self.error_count as f64 / self.request_count as f64 * 100.0
        }
    }
}

pub struct MetricsAggregator {
    state: Mutex<AggregatorState>,
    sink: Arc<dyn MetricsSink>,
    config: AggregatorConfig,
    started_at: Instant,
}

impl MetricsAggregator {
    pub fn new(sink: Arc<dyn MetricsSink>, mut config: AggregatorConfig) -> Self {
        config.history_capacity = config.history_capacity.max(1);

        Self {
            state: Mutex::new(AggregatorState {
                response_times: VecDeque::with_capacity(config.history_capacity.min(4096)),
                ..AggregatorState::default()
            }),
            sink,
            config,
            started_at: Instant::now(),
        }
    }

    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    /// Record one chat request and ship its samples.
    pub async fn track_request(&self, request: TrackedRequest) -> Delivery {
        let samples = self.record_request(request).await;
        self.deliver(samples).await
    }

    /// Update counters and history for one chat request without touching the
    /// sink. Returns the samples describing it, ready for `deliver`.
    pub async fn record_request(&self, request: TrackedRequest) -> Vec<Sample> {
        let response_time_ms = clamp_response_time(request.response_time_ms);

        let mut tags = vec!["endpoint:chat".to_string()];
        if let Some(kind) = &request.error_kind {
            tags.push(format!("error_type:{}", kind));
        }

        let samples = {
            let mut state = self.state.lock().await;

            state.request_count += 1;
            if state.response_times.len() >= self.config.history_capacity {
                state.response_times.pop_front();
            }
            state.response_times.push_back(response_time_ms);
            state.total_response_time_ms += response_time_ms;

            if request.success {
                state.total_tokens += request.tokens_used;
            } else {
                state.error_count += 1;
            }

            let mut samples = vec![Sample::new("response_time_ms", response_time_ms, tags.clone())];
            if request.tokens_used > 0 {
                samples.push(Sample::new(
                    "tokens_used",
                    request.tokens_used as f64,
                    tags.clone(),
                ));
            }
            samples.push(Sample::new(
                "request_count",
                state.request_count as f64,
                tags.clone(),
            ));
            if !request.success {
                let mut error_tags = tags.clone();
                error_tags.push(format!(
                    "error:{}",
                    request.error_kind.as_deref().unwrap_or("unknown")
                ));
                samples.push(Sample::new(
                    "error_count",
                    state.error_count as f64,
                    error_tags,
                ));
            }
            samples.push(Sample::new("error_rate", state.error_rate(), tags));
            samples
        };

        metrics::record_chat_request(request.success, request.error_kind.as_deref());

        samples
    }

    /// Ship a single sample right away.
    pub async fn send_metric(&self, name: &str, value: f64, tags: Vec<String>) -> Delivery {
        self.deliver(vec![Sample::new(name, value, tags)]).await
    }

    pub async fn get_summary(&self) -> MetricsSummary {
        let state = self.state.lock().await;

        let average = if state.request_count == 0 {
            0.0
        } else {
            state.total_response_time_ms / state.request_count as f64
        };

        MetricsSummary {
            total_requests: state.request_count,
            successful_requests: state.request_count - state.error_count,
            failed_requests: state.error_count,
            average_response_time_ms: round2(average),
            total_tokens_used: state.total_tokens,
            uptime_seconds: round2(self.started_at.elapsed().as_secs_f64()),
            error_rate_percent: round2(state.error_rate()),
            buffered_metrics: state.pending_samples.len(),
        }
    }

    /// The last `limit` response times, oldest first.
    pub async fn get_response_time_history(&self, limit: usize) -> Vec<f64> {
        let state = self.state.lock().await;
        let skip = state.response_times.len().saturating_sub(limit);
        state.response_times.iter().skip(skip).copied().collect()
    }

    pub async fn evaluate_alerts(&self) -> Vec<Alert> {
        alerts::evaluate(&self.get_summary().await)
    }

    pub async fn pending_samples(&self) -> Vec<Sample> {
        self.state.lock().await.pending_samples.clone()
    }

    /// Structured application event, tagged with service and environment.
    pub fn log_event(&self, event: &str, data: serde_json::Value) {
        tracing::info!(
            event_name = %event,
            service = %self.config.service,
            env = %self.config.env,
            data = %data,
            "Application event"
        );
    }

    /// Submit samples to the sink within the configured timeout, buffering
    /// them locally when the sink is disabled, refuses them or stalls.
    pub async fn deliver(&self, samples: Vec<Sample>) -> Delivery {
        let sink_name = self.sink.name();

        if !self.sink.is_enabled() {
            tracing::debug!(count = samples.len(), "Metrics buffered (sink not connected)");
            return self.buffer(samples, BufferReason::SinkDisabled).await;
        }

        match tokio::time::timeout(self.config.sink_timeout, self.sink.submit(&samples)).await {
            Ok(Ok(())) => {
                metrics::record_sink_delivery(sink_name, "sent");
                Delivery::Sent
            }
            Ok(Err(e)) => {
                tracing::error!(sink = sink_name, count = samples.len(), error = %e, "Failed to send metrics");
                self.buffer(samples, BufferReason::Rejected(e.to_string()))
                    .await
            }
            Err(_) => {
                tracing::error!(
                    sink = sink_name,
                    count = samples.len(),
                    timeout_ms = self.config.sink_timeout.as_millis() as u64,
                    "Metric delivery timed out"
                );
                self.buffer(samples, BufferReason::TimedOut).await
            }
        }
    }

    async fn buffer(&self, samples: Vec<Sample>, reason: BufferReason) -> Delivery {
        metrics::record_sink_delivery(self.sink.name(), "buffered");

        let count = samples.len();
        self.state.lock().await.pending_samples.extend(samples);
        Delivery::Buffered { reason, count }
    }
}

fn clamp_response_time(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sink::{DisabledSink, MockSink};

    fn aggregator_with(sink: Arc<dyn MetricsSink>) -> MetricsAggregator {
        MetricsAggregator::new(sink, AggregatorConfig::default())
    }

    fn disabled() -> MetricsAggregator {
        aggregator_with(Arc::new(DisabledSink))
    }

    #[tokio::test]
    async fn empty_summary_is_all_zero() {
        let summary = disabled().get_summary().await;

        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.average_response_time_ms, 0.0);
        assert_eq!(summary.error_rate_percent, 0.0);
        assert_eq!(summary.buffered_metrics, 0);
    }

    #[tokio::test]
    async fn counts_every_request_and_only_failed_ones_as_errors() {
        let aggregator = disabled();
        aggregator.track_request(TrackedRequest::success(100.0, 10)).await;
        aggregator.track_request(TrackedRequest::failure(50.0, "api_error")).await;
        aggregator.track_request(TrackedRequest::success(300.0, 0)).await;

        let summary = aggregator.get_summary().await;
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.failed_requests, 1);
        assert_eq!(summary.successful_requests, 2);
        assert!(summary.failed_requests <= summary.total_requests);
    }

    #[tokio::test]
    async fn tokens_only_count_for_successful_requests() {
        let aggregator = disabled();
        aggregator.track_request(TrackedRequest::success(1.0, 120)).await;
        aggregator
            .track_request(TrackedRequest {
                response_time_ms: 1.0,
                tokens_used: 500,
                success: false,
                error_kind: Some("rate_limited".to_string()),
            })
            .await;
        aggregator.track_request(TrackedRequest::success(1.0, 30)).await;

        assert_eq!(aggregator.get_summary().await.total_tokens_used, 150);
    }

    #[tokio::test]
    async fn average_is_the_mean_of_all_response_times() {
        let aggregator = disabled();
        for ms in [100.0, 200.0, 400.0] {
            aggregator.track_request(TrackedRequest::success(ms, 0)).await;
        }

        assert_eq!(aggregator.get_summary().await.average_response_time_ms, 233.33);
    }

    #[tokio::test]
    async fn error_rate_is_rounded_to_two_decimals() {
        let aggregator = disabled();
        aggregator.track_request(TrackedRequest::failure(1.0, "api_error")).await;
        aggregator.track_request(TrackedRequest::success(1.0, 0)).await;
        aggregator.track_request(TrackedRequest::success(1.0, 0)).await;

        assert_eq!(aggregator.get_summary().await.error_rate_percent, 33.33);
    }

    #[tokio::test]
    async fn history_returns_most_recent_in_arrival_order() {
        let aggregator = disabled();
        assert!(aggregator.get_response_time_history(DEFAULT_HISTORY_LIMIT).await.is_empty());

        for ms in 1..=10 {
            aggregator.track_request(TrackedRequest::success(ms as f64, 0)).await;
        }

        assert_eq!(
            aggregator.get_response_time_history(3).await,
            vec![8.0, 9.0, 10.0]
        );
        assert_eq!(aggregator.get_response_time_history(50).await.len(), 10);
    }

    #[tokio::test]
    async fn history_is_bounded_but_average_covers_everything() {
        let aggregator = MetricsAggregator::new(
            Arc::new(DisabledSink),
            AggregatorConfig {
                history_capacity: 3,
                ..AggregatorConfig::default()
            },
        );
        for ms in [10.0, 20.0, 30.0, 40.0, 50.0] {
            aggregator.track_request(TrackedRequest::success(ms, 0)).await;
        }

        assert_eq!(
            aggregator.get_response_time_history(10).await,
            vec![30.0, 40.0, 50.0]
        );
        assert_eq!(aggregator.get_summary().await.average_response_time_ms, 30.0);
    }

    #[tokio::test]
    async fn negative_and_nan_response_times_clamp_to_zero() {
        let aggregator = disabled();
        aggregator.track_request(TrackedRequest::success(-5.0, 0)).await;
        aggregator.track_request(TrackedRequest::success(f64::NAN, 0)).await;

        assert_eq!(aggregator.get_response_time_history(5).await, vec![0.0, 0.0]);
        assert_eq!(aggregator.get_summary().await.average_response_time_ms, 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_tracking_loses_no_updates() {
        let aggregator = Arc::new(disabled());

        let handles: Vec<_> = (0..200)
            .map(|i| {
                let aggregator = Arc::clone(&aggregator);
                tokio::spawn(async move {
                    let request = if i % 10 == 0 {
                        TrackedRequest::failure(5.0, "api_error")
                    } else {
                        TrackedRequest::success(5.0, 1)
                    };
                    aggregator.track_request(request).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let summary = aggregator.get_summary().await;
        assert_eq!(summary.total_requests, 200);
        assert_eq!(summary.failed_requests, 20);
        assert_eq!(summary.total_tokens_used, 180);
    }

    #[tokio::test]
    async fn failing_sink_buffers_one_entry_per_send_metric() {
        let aggregator = aggregator_with(Arc::new(MockSink::failing()));

        for i in 0..5 {
            let delivery = aggregator
                .send_metric("custom_gauge", i as f64, vec!["k:v".to_string()])
                .await;
            assert!(matches!(
                delivery,
                Delivery::Buffered {
                    reason: BufferReason::Rejected(_),
                    count: 1
                }
            ));
            assert_eq!(aggregator.pending_samples().await.len(), i + 1);
        }
    }

    #[tokio::test]
    async fn disabled_sink_buffers_every_sample() {
        let aggregator = disabled();

        let delivery = aggregator.track_request(TrackedRequest::success(10.0, 5)).await;

        assert_eq!(
            delivery,
            Delivery::Buffered {
                reason: BufferReason::SinkDisabled,
                count: 4
            }
        );
        assert_eq!(aggregator.get_summary().await.buffered_metrics, 4);
    }

    #[tokio::test]
    async fn stalled_sink_times_out_and_buffers() {
        let aggregator = MetricsAggregator::new(
            Arc::new(MockSink::stalling(Duration::from_millis(500))),
            AggregatorConfig {
                sink_timeout: Duration::from_millis(20),
                ..AggregatorConfig::default()
            },
        );

        let delivery = aggregator.send_metric("request_count", 1.0, vec![]).await;

        assert_eq!(
            delivery,
            Delivery::Buffered {
                reason: BufferReason::TimedOut,
                count: 1
            }
        );
        assert_eq!(aggregator.pending_samples().await.len(), 1);
    }

    #[tokio::test]
    async fn recording_updates_counters_without_contacting_the_sink() {
        let sink = Arc::new(MockSink::new());
        let aggregator = aggregator_with(sink.clone());

        let samples = aggregator
            .record_request(TrackedRequest::failure(40.0, "network_error"))
            .await;

        assert_eq!(samples.len(), 4);
        assert_eq!(sink.submit_calls(), 0);
        let summary = aggregator.get_summary().await;
        assert_eq!(summary.total_requests, 1);
        assert_eq!(summary.failed_requests, 1);
        assert_eq!(summary.buffered_metrics, 0);

        assert_eq!(aggregator.deliver(samples).await, Delivery::Sent);
        assert_eq!(sink.submitted().len(), 4);
    }

    #[tokio::test]
    async fn successful_request_emits_samples_in_order() {
        let sink = Arc::new(MockSink::new());
        let aggregator = aggregator_with(sink.clone());

        let delivery = aggregator.track_request(TrackedRequest::success(120.0, 42)).await;
        assert_eq!(delivery, Delivery::Sent);

        let names: Vec<_> = sink.submitted().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["response_time_ms", "tokens_used", "request_count", "error_rate"]
        );
        assert_eq!(sink.submit_calls(), 1);
        assert!(aggregator.pending_samples().await.is_empty());
    }

    #[tokio::test]
    async fn failed_request_tags_error_samples() {
        let sink = Arc::new(MockSink::new());
        let aggregator = aggregator_with(sink.clone());

        aggregator.track_request(TrackedRequest::failure(80.0, "rate_limited")).await;

        let samples = sink.submitted();
        let names: Vec<_> = samples.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["response_time_ms", "request_count", "error_count", "error_rate"]
        );

        assert_eq!(
            samples[0].tags,
            vec!["endpoint:chat".to_string(), "error_type:rate_limited".to_string()]
        );
        assert!(samples[2].tags.contains(&"error:rate_limited".to_string()));
        assert_eq!(samples[3].value, 100.0);
    }

    #[tokio::test]
    async fn failure_without_kind_is_tagged_unknown() {
        let sink = Arc::new(MockSink::new());
        let aggregator = aggregator_with(sink.clone());

        aggregator
            .track_request(TrackedRequest {
                response_time_ms: 1.0,
                tokens_used: 0,
                success: false,
                error_kind: None,
            })
            .await;

        let error_sample = sink
            .submitted()
            .into_iter()
            .find(|s| s.name == "error_count")
            .unwrap();
        assert_eq!(
            error_sample.tags,
            vec!["endpoint:chat".to_string(), "error:unknown".to_string()]
        );
    }
}
