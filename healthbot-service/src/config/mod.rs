use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on a single sink delivery attempt before the samples are buffered.
const DEFAULT_SINK_TIMEOUT_MS: u64 = 2_000;

/// Number of response times kept for the dashboard history.
const DEFAULT_RESPONSE_HISTORY_CAPACITY: usize = 1_000;

const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct HealthbotConfig {
    pub common: core_config::Config,
    pub service: ServiceConfig,
    pub datadog: DatadogConfig,
    pub google: GoogleConfig,
    /// Span export target. Tracing stays log-only when unset.
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub debug: bool,
    /// Extra origin allowed by CORS, next to the local dev servers.
    pub frontend_url: String,
    pub response_history_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct DatadogConfig {
    pub api_key: Option<Secret<String>>,
    pub app_key: Option<Secret<String>>,
    pub site: String,
    pub service: String,
    pub env: String,
    /// Overrides `https://api.{site}`; used to point the sink at a proxy or test server.
    pub api_base_url: Option<String>,
    pub timeout_ms: u64,
}

impl DatadogConfig {
    pub fn base_url(&self) -> String {
        self.api_base_url
            .clone()
            .unwrap_or_else(|| format!("https://api.{}", self.site))
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub api_base_url: String,
}

impl HealthbotConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        Ok(HealthbotConfig {
            common: common_config,
            service: ServiceConfig {
                debug: get_parsed_env("DEBUG", true)?,
                frontend_url: get_env("FRONTEND_URL", "http://localhost:3000"),
                response_history_capacity: get_parsed_env(
                    "RESPONSE_HISTORY_CAPACITY",
                    DEFAULT_RESPONSE_HISTORY_CAPACITY,
                )?,
            },
            datadog: DatadogConfig {
                api_key: get_secret_env("DD_API_KEY"),
                app_key: get_secret_env("DD_APP_KEY"),
                site: get_env("DD_SITE", "datadoghq.com"),
                service: get_env("DD_SERVICE", "healthbot-monitor"),
                env: get_env("DD_ENV", "development"),
                api_base_url: get_optional_env("DD_API_BASE_URL"),
                timeout_ms: get_parsed_env("DD_SINK_TIMEOUT_MS", DEFAULT_SINK_TIMEOUT_MS)?,
            },
            google: GoogleConfig {
                api_key: get_secret_env("GOOGLE_API_KEY"),
                model: get_env("GEMINI_MODEL", "gemini-2.5-flash"),
                api_base_url: get_env("GEMINI_API_BASE_URL", DEFAULT_GEMINI_API_BASE),
            },
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
        })
    }

    /// Filter directive handed to the subscriber when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        if self.service.debug {
            "debug"
        } else {
            "info"
        }
    }

    /// Origins accepted by the CORS layer.
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![
            "http://localhost:3000".to_string(),
            "http://localhost:5173".to_string(),
        ];
        if !origins.contains(&self.service.frontend_url) {
            origins.push(self.service.frontend_url.clone());
        }
        origins
    }
}

fn get_env(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Unset and blank values are both treated as absent.
fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn get_secret_env(key: &str) -> Option<Secret<String>> {
    get_optional_env(key).map(Secret::new)
}

fn get_parsed_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional_env(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().to_lowercase().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}
