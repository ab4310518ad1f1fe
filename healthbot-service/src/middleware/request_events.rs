use crate::services::aggregator::MetricsAggregator;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::json;
use std::sync::Arc;

/// Emits a `request_received` application event for every incoming request.
pub async fn request_event_middleware(
    State(aggregator): State<Arc<MetricsAggregator>>,
    req: Request,
    next: Next,
) -> Response {
    aggregator.log_event(
        "request_received",
        json!({
            "path": req.uri().path(),
            "method": req.method().as_str(),
        }),
    );

    next.run(req).await
}
