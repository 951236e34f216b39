//! API Middleware
//!
//! Request logging. Every request gets a correlation id, taken from the
//! `X-Correlation-Id` header when the caller sends a valid one, and the id
//! is echoed back on the response.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Never written to logs
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), shown)
        })
        .collect()
}

pub fn correlation_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let correlation_id = correlation_id(request.headers()).unwrap_or_else(Uuid::new_v4);
    let span = tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        %correlation_id,
    );

    async move {
        tracing::debug!(headers = ?mask_headers_for_logging(request.headers()), "Incoming request");
        let start = std::time::Instant::now();

        let mut response = next.run(request).await;

        tracing::info!(
            status = %response.status(),
            duration_ms = %start.elapsed().as_millis(),
            "Request completed"
        );
        if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}
