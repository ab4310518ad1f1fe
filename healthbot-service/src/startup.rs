//! Application startup and lifecycle management.

use crate::config::HealthbotConfig;
use crate::handlers;
use crate::middleware::{handle_panic, request_event_middleware, request_tracking_middleware};
use crate::services::aggregator::{AggregatorConfig, MetricsAggregator};
use crate::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use crate::services::providers::TextProvider;
use crate::services::responder::HealthResponder;
use crate::services::sink::{DatadogSink, DatadogSinkConfig, DisabledSink, MetricsSink};
use axum::{
    http::{HeaderValue, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware, timing_middleware,
    REQUEST_ID_HEADER,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HealthbotConfig>,
    pub aggregator: Arc<MetricsAggregator>,
    pub responder: Arc<HealthResponder>,
    /// Whether spans are exported over OTLP.
    pub tracing_enabled: bool,
}

impl AppState {
    /// Wire the sink and provider from configuration. Missing credentials
    /// degrade to a disabled sink or a responder without provider.
    pub fn from_config(config: HealthbotConfig, tracing_enabled: bool) -> Self {
        let sink: Arc<dyn MetricsSink> = match DatadogSinkConfig::from_config(&config.datadog) {
            Some(sink_config) => match DatadogSink::new(sink_config) {
                Ok(sink) => {
                    tracing::info!(site = %config.datadog.site, "Datadog metrics sink initialized");
                    Arc::new(sink)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize Datadog sink: {}. Buffering locally.", e);
                    Arc::new(DisabledSink)
                }
            },
            None => {
                tracing::warn!(
                    "Datadog credentials not configured - metrics will be buffered locally"
                );
                Arc::new(DisabledSink)
            }
        };

        let provider = match &config.google.api_key {
            Some(api_key) => {
                let gemini_config = GeminiConfig {
                    api_key: api_key.clone(),
                    model: config.google.model.clone(),
                    api_base_url: config.google.api_base_url.clone(),
                };
                match GeminiTextProvider::new(gemini_config) {
                    Ok(provider) => {
                        tracing::info!(model = %config.google.model, "Initialized Gemini text provider");
                        let provider: Arc<dyn TextProvider> = Arc::new(provider);
                        Some(provider)
                    }
                    Err(e) => {
                        tracing::error!("Failed to initialize Gemini: {}", e);
                        None
                    }
                }
            }
            None => {
                tracing::warn!("Google API key not configured - AI features disabled");
                None
            }
        };

        let aggregator = Arc::new(MetricsAggregator::new(
            sink,
            AggregatorConfig {
                history_capacity: config.service.response_history_capacity,
                sink_timeout: config.datadog.sink_timeout(),
                service: config.datadog.service.clone(),
                env: config.datadog.env.clone(),
            },
        ));
        let responder = Arc::new(HealthResponder::new(provider, config.google.model.clone()));

        Self {
            config: Arc::new(config),
            aggregator,
            responder,
            tracing_enabled,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins());
    let aggregator = Arc::clone(&state.aggregator);

    // Panics are caught inside the tracking layer so they are counted.
    let chat_route = post(handlers::chat)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(from_fn_with_state(
            Arc::clone(&state.aggregator),
            request_tracking_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/chat", chat_route)
        .route(
            "/conversation/:conversation_id",
            delete(handlers::clear_conversation),
        )
        .route("/metrics", get(handlers::metrics_summary))
        .route("/metrics/prometheus", get(handlers::prometheus_metrics))
        .route("/dashboard", get(handlers::dashboard))
        .route("/alerts", get(handlers::alerts))
        .route("/alerts/setup", post(handlers::setup_alerts))
        .route("/stats", get(handlers::stats))
        .with_state(state)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn_with_state(aggregator, request_event_middleware))
        .layer(from_fn(timing_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

const PROVIDER_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: HealthbotConfig, tracing_enabled: bool) -> Result<Self, AppError> {
        let state = AppState::from_config(config, tracing_enabled);
        if state.responder.is_connected() {
            check_provider(&state.responder).await;
        }
        Self::with_state(state).await
    }

    /// Bind the listener for an already wired state (port 0 = random port for testing).
    pub async fn with_state(state: AppState) -> Result<Self, AppError> {
        let address = state.config.common.bind_address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();
        let router = build_router(state.clone());

        Ok(Self {
            port,
            listener,
            router,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        let aggregator = Arc::clone(&self.state.aggregator);

        aggregator.log_event(
            "app_startup",
            json!({
                "gemini_connected": self.state.responder.is_connected(),
                "datadog_connected": aggregator.sink().is_enabled(),
                "tracing_enabled": self.state.tracing_enabled,
                "port": self.port,
            }),
        );

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        let summary = aggregator.get_summary().await;
        aggregator.log_event(
            "app_shutdown",
            json!({
                "total_requests": summary.total_requests,
                "buffered_metrics": summary.buffered_metrics,
            }),
        );

        Ok(())
    }
}

/// Startup connectivity check. Failures only warn: the service still serves
/// and answers with the apology message until the provider recovers.
async fn check_provider(responder: &HealthResponder) {
    match tokio::time::timeout(PROVIDER_CHECK_TIMEOUT, responder.check_provider()).await {
        Ok(Ok(())) => tracing::info!(model = %responder.model(), "Gemini API reachable"),
        Ok(Err(e)) => tracing::warn!(model = %responder.model(), error = %e, "Gemini health check failed"),
        Err(_) => tracing::warn!(
            model = %responder.model(),
            timeout_secs = PROVIDER_CHECK_TIMEOUT.as_secs(),
            "Gemini health check timed out"
        ),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
