//! Axum middleware shared by every service.

pub mod metrics;
pub mod security_headers;
pub mod timing;
pub mod tracing;

pub use self::metrics::metrics_middleware;
pub use self::security_headers::security_headers_middleware;
pub use self::timing::{PROCESS_TIME_HEADER, timing_middleware};
pub use self::tracing::{REQUEST_ID_HEADER, request_id_middleware};
