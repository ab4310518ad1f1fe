//! Records exactly one tracked request per chat call.
//!
//! The chat handler attaches a `ChatOutcome` to its response. Responses
//! without one are tracked as failures when they are server errors (panics
//! caught by `CatchPanicLayer` land here), and requests whose future is dropped
//! before completion are tracked as cancelled from the guard's `Drop`.
//! Counters are settled before the response is returned; delivery to the
//! sink happens in the background.

use crate::services::aggregator::{MetricsAggregator, TrackedRequest};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::ErrorResponse;
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

/// Response extension carrying what the handler wants recorded.
#[derive(Debug, Clone)]
pub struct ChatOutcome(pub TrackedRequest);

struct TrackingGuard {
    aggregator: Arc<MetricsAggregator>,
    start: Instant,
    armed: bool,
}

impl TrackingGuard {
    fn new(aggregator: Arc<MetricsAggregator>) -> Self {
        Self {
            aggregator,
            start: Instant::now(),
            armed: true,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let request = TrackedRequest::failure(self.elapsed_ms(), "cancelled");
        let aggregator = Arc::clone(&self.aggregator);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    aggregator.track_request(request).await;
                });
            }
            Err(_) => tracing::warn!("Chat request dropped outside a runtime; not tracked"),
        }
    }
}

pub async fn request_tracking_middleware(
    State(aggregator): State<Arc<MetricsAggregator>>,
    req: Request,
    next: Next,
) -> Response {
    let mut guard = TrackingGuard::new(Arc::clone(&aggregator));

    let mut response = next.run(req).await;

    let tracked = match response.extensions_mut().remove::<ChatOutcome>() {
        Some(ChatOutcome(request)) => Some(request),
        None if response.status().is_server_error() => {
            Some(TrackedRequest::failure(guard.elapsed_ms(), "internal_error"))
        }
        None => None,
    };
    guard.disarm();

    if let Some(request) = tracked {
        // Counters are updated before the response leaves; sink delivery is
        // detached so a slow sink never holds the response.
        let recorder = Arc::clone(&aggregator);
        match tokio::spawn(async move { recorder.record_request(request).await }).await {
            Ok(samples) => {
                tokio::spawn(async move {
                    aggregator.deliver(samples).await;
                });
            }
            Err(e) => tracing::error!(error = %e, "Request tracking task failed"),
        }
    }

    response
}

/// Response for a panic in the chat pipeline.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    tracing::error!(panic = %details, "Unhandled fault in chat pipeline");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(
            "Internal Server Error",
            Some("Failed to process chat request".to_string()),
        )),
    )
        .into_response()
}
