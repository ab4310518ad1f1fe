//! Local alert evaluation over the current metrics summary.

use crate::services::aggregator::MetricsSummary;
use serde::Serialize;

const RESPONSE_TIME_CRITICAL_MS: f64 = 5000.0;
const RESPONSE_TIME_WARNING_MS: f64 = 3000.0;
const ERROR_RATE_CRITICAL_PERCENT: f64 = 5.0;
const ERROR_RATE_WARNING_PERCENT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub severity: Severity,
    pub name: String,
    pub message: String,
    pub value: f64,
}

/// Alerts for the summary, response time first then error rate. A critical
/// breach suppresses the warning for the same quantity.
pub fn evaluate(summary: &MetricsSummary) -> Vec<Alert> {
    let mut alerts = Vec::new();

    let avg = summary.average_response_time_ms;
    if avg > RESPONSE_TIME_CRITICAL_MS {
        alerts.push(response_time_alert(
            Severity::Critical,
            "High Response Time",
            avg,
            RESPONSE_TIME_CRITICAL_MS,
        ));
    } else if avg > RESPONSE_TIME_WARNING_MS {
        alerts.push(response_time_alert(
            Severity::Warning,
            "Elevated Response Time",
            avg,
            RESPONSE_TIME_WARNING_MS,
        ));
    }

    let rate = summary.error_rate_percent;
    if rate > ERROR_RATE_CRITICAL_PERCENT {
        alerts.push(error_rate_alert(
            Severity::Critical,
            "High Error Rate",
            rate,
            ERROR_RATE_CRITICAL_PERCENT,
        ));
    } else if rate > ERROR_RATE_WARNING_PERCENT {
        alerts.push(error_rate_alert(
            Severity::Warning,
            "Elevated Error Rate",
            rate,
            ERROR_RATE_WARNING_PERCENT,
        ));
    }

    alerts
}

fn response_time_alert(severity: Severity, name: &str, value: f64, bound: f64) -> Alert {
    Alert {
        severity,
        name: name.to_string(),
        message: format!("Average response time is {:.0}ms (> {}ms)", value, bound),
        value,
    }
}

fn error_rate_alert(severity: Severity, name: &str, value: f64, bound: f64) -> Alert {
    Alert {
        severity,
        name: name.to_string(),
        message: format!("Error rate is {:.1}% (> {}%)", value, bound),
        value,
    }
}
