use healthbot_service::config::HealthbotConfig;
use healthbot_service::services::metrics;
use healthbot_service::startup::Application;
use service_core::observability::{init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = HealthbotConfig::load()?;

    let tracing_enabled = init_tracing(
        &config.datadog.service,
        config.log_level(),
        config.otlp_endpoint.as_deref(),
    );
    metrics::init_metrics();

    let application = Application::build(config, tracing_enabled).await?;
    tracing::info!(
        port = application.port(),
        gemini_connected = application.state().responder.is_connected(),
        datadog_connected = application.state().aggregator.sink().is_enabled(),
        tracing_enabled,
        "HealthBot Monitor listening"
    );

    let result = application.run_until_stopped().await;
    shutdown_tracing();

    result.map_err(Into::into)
}
