use crate::models::{
    AlertSetupResponse, AlertsResponse, DashboardData, DatadogStats, GeminiStats, HealthMetrics,
    MetricData, StatsResponse,
};
use crate::services::aggregator::DEFAULT_HISTORY_LIMIT;
use crate::services::monitors;
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use service_core::error::AppError;

pub async fn metrics_summary(State(state): State<AppState>) -> Json<HealthMetrics> {
    Json(HealthMetrics::from(state.aggregator.get_summary().await))
}

pub async fn prometheus_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::services::metrics::get_metrics(),
    )
}

pub async fn dashboard(State(state): State<AppState>) -> Json<DashboardData> {
    let summary = state.aggregator.get_summary().await;
    let now = Utc::now();

    let response_time_history = state
        .aggregator
        .get_response_time_history(DEFAULT_HISTORY_LIMIT)
        .await
        .into_iter()
        .map(|value| MetricData {
            name: "response_time".to_string(),
            value,
            timestamp: now,
        })
        .collect();

    Json(DashboardData {
        metrics: HealthMetrics::from(summary),
        recent_alerts: Vec::new(),
        response_time_history,
        error_rate_history: Vec::new(),
        token_usage_history: Vec::new(),
    })
}

pub async fn alerts(State(state): State<AppState>) -> Json<AlertsResponse> {
    Json(AlertsResponse::from(state.aggregator.evaluate_alerts().await))
}

#[derive(Debug, Deserialize)]
pub struct AlertSetupQuery {
    pub email: Option<String>,
}

#[tracing::instrument(skip(state))]
pub async fn setup_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertSetupQuery>,
) -> Result<Json<AlertSetupResponse>, AppError> {
    let sink = state.aggregator.sink();
    if !sink.is_enabled() {
        return Err(AppError::ServiceUnavailable(
            "Datadog is not connected. Please configure DD_API_KEY and DD_APP_KEY".to_string(),
        ));
    }

    let created = monitors::setup_default_alerts(
        sink.as_ref(),
        &state.config.datadog.service,
        query.email.as_deref(),
        state.config.datadog.sink_timeout(),
    )
    .await;

    Ok(Json(AlertSetupResponse {
        message: "Datadog alerts configured successfully".to_string(),
        monitors_created: created.len(),
        monitors: created,
    }))
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let summary = state.aggregator.get_summary().await;
    let buffered_metrics = summary.buffered_metrics;

    Json(StatsResponse {
        metrics: summary,
        gemini: GeminiStats {
            connected: state.responder.is_connected(),
            model: state.responder.model().to_string(),
            active_conversations: state.responder.conversation_count(),
        },
        datadog: DatadogStats {
            connected: state.aggregator.sink().is_enabled(),
            buffered_metrics,
        },
        tracing_enabled: state.tracing_enabled,
    })
}
