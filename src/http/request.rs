//! Request identification.
//!
//! # Responsibilities
//! - Request ID generated as early as possible (UUID v4, `x-request-id`)
//! - Incoming IDs are kept, and echoed on the response
//! - Every request gets a span carrying its ID

use axum::body::Body;
use axum::http::Request;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Span factory for the trace layer.
pub fn make_request_span(request: &Request<Body>) -> tracing::Span {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}
