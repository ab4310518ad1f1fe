#![allow(dead_code)]

use healthbot_service::config::{DatadogConfig, GoogleConfig, HealthbotConfig, ServiceConfig};
use healthbot_service::services::aggregator::{AggregatorConfig, MetricsAggregator};
use healthbot_service::services::metrics;
use healthbot_service::services::providers::mock::MockTextProvider;
use healthbot_service::services::providers::TextProvider;
use healthbot_service::services::responder::HealthResponder;
use healthbot_service::services::sink::{DisabledSink, MetricsSink, MockSink};
use healthbot_service::startup::{AppState, Application};
use service_core::config::Config as CoreConfig;
use std::sync::Arc;
use std::time::Duration;

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub state: AppState,
    pub client: reqwest::Client,
}

pub fn test_config() -> HealthbotConfig {
    HealthbotConfig {
        common: CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service: ServiceConfig {
            debug: true,
            frontend_url: "http://localhost:3000".to_string(),
            response_history_capacity: 1000,
        },
        datadog: DatadogConfig {
            api_key: None,
            app_key: None,
            site: "datadoghq.com".to_string(),
            service: "healthbot-test".to_string(),
            env: "test".to_string(),
            api_base_url: None,
            timeout_ms: 500,
        },
        google: GoogleConfig {
            api_key: None,
            model: "gemini-2.5-flash".to_string(),
            api_base_url: "http://127.0.0.1:1".to_string(),
        },
        otlp_endpoint: None,
    }
}

impl TestApp {
    /// Mock provider and recording sink.
    pub async fn spawn() -> Self {
        Self::spawn_with(
            Some(Arc::new(MockTextProvider::new())),
            Arc::new(MockSink::new()),
        )
        .await
    }

    /// No AI credential and no sink credentials.
    pub async fn spawn_degraded() -> Self {
        Self::spawn_with(None, Arc::new(DisabledSink)).await
    }

    pub async fn spawn_with(
        provider: Option<Arc<dyn TextProvider>>,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        metrics::init_metrics();

        let config = test_config();
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

        let state = AppState {
            config: Arc::new(config),
            aggregator,
            responder,
            tracing_enabled: false,
        };

        let app = Application::with_state(state.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            state,
            client,
        }
    }

    pub async fn post_chat(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/chat", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute chat request")
    }

    /// Sink delivery runs after the response; wait until `expected` samples
    /// have landed in the local buffer.
    pub async fn wait_for_buffered(&self, expected: usize) {
        for _ in 0..100 {
            if self.state.aggregator.pending_samples().await.len() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn get_json(&self, path: &str) -> serde_json::Value {
        self.client
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .expect("Failed to execute request")
            .json()
            .await
            .expect("Response was not JSON")
    }
}

/// Wait until the sink has received `expected` submissions.
pub async fn wait_for_submissions(sink: &MockSink, expected: u64) {
    for _ in 0..100 {
        if sink.submit_calls() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
