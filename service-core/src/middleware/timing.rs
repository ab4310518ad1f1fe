use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

pub const PROCESS_TIME_HEADER: &str = "x-process-time-ms";

/// Stamps the response with the wall time spent producing it, in
/// milliseconds rounded to two decimals.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();

    let mut response = next.run(req).await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let rounded = (elapsed_ms * 100.0).round() / 100.0;

    if let Ok(value) = HeaderValue::from_str(&rounded.to_string()) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, middleware::from_fn, routing::get};
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn adds_process_time_header() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn(timing_middleware));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let value: f64 = response.headers()[PROCESS_TIME_HEADER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(value >= 0.0);
    }
}
