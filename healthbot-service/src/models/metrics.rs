use crate::services::aggregator::MetricsSummary;
use crate::services::alerts::{Alert, Severity};
use crate::services::monitors::CreatedMonitor;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub health: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub gemini_connected: bool,
    pub datadog_connected: bool,
    pub timestamp: DateTime<Utc>,
}

/// Summary as served on `/metrics` and inside the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct HealthMetrics {
    #[serde(flatten)]
    pub summary: MetricsSummary,
    pub last_updated: DateTime<Utc>,
}

impl From<MetricsSummary> for HealthMetrics {
    fn from(summary: MetricsSummary) -> Self {
        Self {
            summary,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricData {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub metrics: HealthMetrics,
    pub recent_alerts: Vec<Alert>,
    pub response_time_history: Vec<MetricData>,
    pub error_rate_history: Vec<MetricData>,
    pub token_usage_history: Vec<MetricData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<Alert>,
    pub total_alerts: usize,
    pub critical_count: usize,
    pub warning_count: usize,
}

impl From<Vec<Alert>> for AlertsResponse {
    fn from(alerts: Vec<Alert>) -> Self {
        let count = |severity: Severity| alerts.iter().filter(|a| a.severity == severity).count();
        let critical_count = count(Severity::Critical);
        let warning_count = count(Severity::Warning);

        Self {
            total_alerts: alerts.len(),
            critical_count,
            warning_count,
            alerts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertSetupResponse {
    pub message: String,
    pub monitors_created: usize,
    pub monitors: Vec<CreatedMonitor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeminiStats {
    pub connected: bool,
    pub model: String,
    pub active_conversations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatadogStats {
    pub connected: bool,
    pub buffered_metrics: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub metrics: MetricsSummary,
    pub gemini: GeminiStats,
    pub datadog: DatadogStats,
    pub tracing_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(severity: Severity) -> Alert {
        Alert {
            severity,
            name: "test".to_string(),
            message: "test".to_string(),
            value: 1.0,
        }
    }

    #[test]
    fn alerts_response_counts_by_severity() {
        let response = AlertsResponse::from(vec![
            alert(Severity::Critical),
            alert(Severity::Warning),
            alert(Severity::Critical),
        ]);

        assert_eq!(response.total_alerts, 3);
        assert_eq!(response.critical_count, 2);
        assert_eq!(response.warning_count, 1);
    }

    #[test]
    fn health_metrics_flattens_summary() {
        let metrics = HealthMetrics::from(MetricsSummary {
            total_requests: 4,
            successful_requests: 3,
            failed_requests: 1,
            average_response_time_ms: 12.5,
            total_tokens_used: 40,
            uptime_seconds: 2.0,
            error_rate_percent: 25.0,
            buffered_metrics: 0,
        });

        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["total_requests"], 4);
        assert_eq!(json["failed_requests"], 1);
        assert!(json["last_updated"].is_string());
    }
}
