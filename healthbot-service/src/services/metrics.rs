//! Process-local Prometheus metrics for healthbot-service.
//!
//! HTTP metrics recorded by the shared middleware go through the `metrics`
//! facade; chat, provider and sink metrics live in a `prometheus` registry.
//! Both are rendered together on `/metrics/prometheus`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{Once, OnceLock};

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub static CHAT_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static CHAT_TOKENS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PROVIDER_LATENCY_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static PROVIDER_ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static SINK_DELIVERIES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

static INIT: Once = Once::new();

/// Initialize all metrics. Only the first call has an effect.
pub fn init_metrics() {
    INIT.call_once(|| {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
        }

        match register_service_metrics() {
            Ok(()) => tracing::info!("Prometheus metrics initialized"),
            Err(e) => tracing::error!(error = %e, "Failed to register service metrics"),
        }
    });
}

fn register_service_metrics() -> prometheus::Result<()> {
    let registry = Registry::new();

    // outcome: success, failed
    let chat_requests = IntCounterVec::new(
        Opts::new("healthbot_chat_requests_total", "Total tracked chat requests"),
        &["outcome", "error_type"],
    )?;

    let chat_tokens = IntCounterVec::new(
        Opts::new("healthbot_chat_tokens_total", "Total tokens used by chat answers"),
        &["model"],
    )?;

    let provider_latency = HistogramVec::new(
        HistogramOpts::new(
            "healthbot_provider_latency_seconds",
            "AI provider API latency in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["provider", "model"],
    )?;

    let provider_errors = IntCounterVec::new(
        Opts::new("healthbot_provider_errors_total", "Total AI provider errors"),
        &["provider", "error_type"],
    )?;

    // status: sent, buffered
    let sink_deliveries = IntCounterVec::new(
        Opts::new(
            "healthbot_sink_deliveries_total",
            "Metric sink delivery attempts by sink and status",
        ),
        &["sink", "status"],
    )?;

    registry.register(Box::new(chat_requests.clone()))?;
    registry.register(Box::new(chat_tokens.clone()))?;
    registry.register(Box::new(provider_latency.clone()))?;
    registry.register(Box::new(provider_errors.clone()))?;
    registry.register(Box::new(sink_deliveries.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = CHAT_REQUESTS_TOTAL.set(chat_requests);
    let _ = CHAT_TOKENS_TOTAL.set(chat_tokens);
    let _ = PROVIDER_LATENCY_SECONDS.set(provider_latency);
    let _ = PROVIDER_ERRORS_TOTAL.set(provider_errors);
    let _ = SINK_DELIVERIES_TOTAL.set(sink_deliveries);

    Ok(())
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            output.push_str("# Metrics registry not initialized\n");
            return output;
        }
    };

    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        output.push_str(&format!("# Failed to encode metrics: {}\n", e));
        return output;
    }

    match String::from_utf8(buffer) {
        Ok(s) => output.push_str(&s),
        Err(e) => {
            tracing::error!(error = %e, "Failed to convert metrics to UTF-8");
            output.push_str(&format!("# Failed to convert metrics to UTF-8: {}\n", e));
        }
    }

    output
}

/// Record a tracked chat request.
pub fn record_chat_request(success: bool, error_type: Option<&str>) {
    if let Some(counter) = CHAT_REQUESTS_TOTAL.get() {
        let outcome = if success { "success" } else { "failed" };
        counter
            .with_label_values(&[outcome, error_type.unwrap_or("none")])
            .inc();
    }
}

/// Record tokens spent on an answer.
pub fn record_tokens(model: &str, tokens: u64) {
    if let Some(counter) = CHAT_TOKENS_TOTAL.get() {
        counter.with_label_values(&[model]).inc_by(tokens);
    }
}

/// Record provider latency.
pub fn record_provider_latency(provider: &str, model: &str, duration_secs: f64) {
    if let Some(histogram) = PROVIDER_LATENCY_SECONDS.get() {
        histogram
            .with_label_values(&[provider, model])
            .observe(duration_secs);
    }
}

/// Record a provider error.
pub fn record_provider_error(provider: &str, error_type: &str) {
    if let Some(counter) = PROVIDER_ERRORS_TOTAL.get() {
        counter.with_label_values(&[provider, error_type]).inc();
    }
}

/// Record a sink delivery attempt.
pub fn record_sink_delivery(sink: &str, status: &str) {
    if let Some(counter) = SINK_DELIVERIES_TOTAL.get() {
        counter.with_label_values(&[sink, status]).inc();
    }
}
