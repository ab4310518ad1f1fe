//! HTTP handlers for healthbot-service.

pub mod chat;
pub mod health;
pub mod monitoring;

pub use chat::{chat, clear_conversation};
pub use health::{health_check, root};
pub use monitoring::{alerts, dashboard, metrics_summary, prometheus_metrics, setup_alerts, stats};
