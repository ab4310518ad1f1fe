pub mod chat;
pub mod metrics;

pub use chat::{ChatRequest, ChatResponse};
pub use metrics::{
    AlertSetupResponse, AlertsResponse, DashboardData, DatadogStats, GeminiStats,
    HealthCheckResponse, HealthMetrics, MessageResponse, MetricData, ServiceInfo, StatsResponse,
};
