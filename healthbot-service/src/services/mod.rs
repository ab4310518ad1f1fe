pub mod aggregator;
pub mod alerts;
pub mod metrics;
pub mod monitors;
pub mod providers;
pub mod responder;
pub mod sink;
