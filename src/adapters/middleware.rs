//! Axum middleware attached to the gateway router.
use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

/// Log start and end of every request including latency.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    tracing::debug!("Started processing {} {} {:?}", method, uri, version);

    let response = next.run(req).await;
    let duration = start.elapsed();

    tracing::info!(
        http.method = %method,
        http.path = uri.path(),
        http.status_code = response.status().as_u16(),
        duration_ms = duration.as_millis() as u64,
        "Completed {} {} {:?} - {} in {:?}",
        method,
        uri,
        version,
        response.status(),
        duration
    );

    response
}
