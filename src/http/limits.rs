//! Concurrency limiting middleware.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Semaphore;

use crate::observability::metrics;

/// Reject with 503 when `http.concurrency` requests are already in flight.
pub async fn limit_concurrency(State(limiter): State<Arc<Semaphore>>, request: Request, next: Next) -> Response {
    match limiter.try_acquire_owned() {
        Ok(_permit) => next.run(request).await,
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Concurrency limit reached");
            metrics::record_rejected("concurrency");
            (StatusCode::SERVICE_UNAVAILABLE, "Server is busy").into_response()
        }
    }
}
