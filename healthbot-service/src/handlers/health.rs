use crate::models::{HealthCheckResponse, ServiceInfo};
use crate::startup::AppState;
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "HealthBot Monitor",
        version: env!("CARGO_PKG_VERSION"),
        description: "AI Health Assistant with Datadog Observability",
        health: "/health",
    })
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        gemini_connected: state.responder.is_connected(),
        datadog_connected: state.aggregator.sink().is_enabled(),
        timestamp: Utc::now(),
    })
}
