//! Remote alert rules provisioned on the sink.

use crate::services::sink::MetricsSink;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorThresholds {
    pub critical: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorDefinition {
    pub name: String,
    pub query: String,
    pub message: String,
    pub thresholds: MonitorThresholds,
    pub notify_no_data: bool,
    pub renotify_interval: u32,
}

impl MonitorDefinition {
    fn metric_alert(
        name: &str,
        query: String,
        message: &str,
        notify: &str,
        thresholds: MonitorThresholds,
    ) -> Self {
        let message = if notify.is_empty() {
            message.to_string()
        } else {
            format!("{} {}", message, notify)
        };

        Self {
            name: name.to_string(),
            query,
            message,
            thresholds,
            notify_no_data: false,
            renotify_interval: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedMonitor {
    pub id: i64,
    pub name: String,
    pub status: String,
}

impl CreatedMonitor {
    pub fn created(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            status: "created".to_string(),
        }
    }
}

/// The four rules every deployment gets.
pub fn default_monitors(service: &str, notification_email: Option<&str>) -> Vec<MonitorDefinition> {
    let notify = notification_email
        .filter(|email| !email.trim().is_empty())
        .map(|email| format!("@{}", email.trim()))
        .unwrap_or_default();

    vec![
        MonitorDefinition::metric_alert(
            "HealthBot - High Response Time Alert",
            format!(
                "avg(last_5m):avg:healthbot.response_time_ms{{service:{}}} > 5000",
                service
            ),
            "🚨 HealthBot response time is too high! Average > 5 seconds.\n\nPlease investigate immediately.",
            &notify,
            MonitorThresholds {
                critical: 5000.0,
                warning: Some(3000.0),
            },
        ),
        MonitorDefinition::metric_alert(
            "HealthBot - High Error Rate Alert",
            format!(
                "avg(last_5m):avg:healthbot.error_rate{{service:{}}} > 5",
                service
            ),
            "⚠️ HealthBot error rate is above 5%!\n\nCheck logs for errors.",
            &notify,
            MonitorThresholds {
                critical: 5.0,
                warning: Some(2.0),
            },
        ),
        MonitorDefinition::metric_alert(
            "HealthBot - Token Usage Spike Alert",
            format!(
                "avg(last_5m):avg:healthbot.tokens_used{{service:{}}} > 10000",
                service
            ),
            "📊 HealthBot token usage is spiking!\n\nMonitor for cost implications.",
            &notify,
            MonitorThresholds {
                critical: 10000.0,
                warning: Some(5000.0),
            },
        ),
        MonitorDefinition::metric_alert(
            "HealthBot - Service Health Check",
            format!(
                "avg(last_10m):avg:healthbot.request_count{{service:{}}} < 1",
                service
            ),
            "🔴 HealthBot may be down! No requests in last 10 minutes.\n\nCheck service status.",
            &notify,
            MonitorThresholds {
                critical: 1.0,
                warning: None,
            },
        ),
    ]
}

/// Creates the default rules, skipping any the sink refuses or does not
/// answer within `timeout`.
pub async fn setup_default_alerts(
    sink: &dyn MetricsSink,
    service: &str,
    notification_email: Option<&str>,
    timeout: Duration,
) -> Vec<CreatedMonitor> {
    let mut created = Vec::new();

    for monitor in default_monitors(service, notification_email) {
        match tokio::time::timeout(timeout, sink.create_monitor(&monitor)).await {
            Ok(Ok(result)) => {
                tracing::info!(monitor_name = %result.name, monitor_id = result.id, "Monitor created");
                created.push(result);
            }
            Ok(Err(e)) => {
                tracing::error!(monitor_name = %monitor.name, error = %e, "Failed to create monitor");
            }
            Err(_) => {
                tracing::error!(
                    monitor_name = %monitor.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Monitor creation timed out"
                );
            }
        }
    }

    tracing::info!(monitors_created = created.len(), "Default alerts setup complete");
    created
}
