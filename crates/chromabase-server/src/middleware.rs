//! Middleware for the REST API server.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::ErrorEnvelope;
use crate::state::AppState;

/// Create CORS middleware.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Request logging middleware.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    response
}

/// Report error envelopes with HTTP 200 unless conventional codes are enabled.
///
/// Clients of this API read `status` in the body, not the HTTP status.
pub async fn envelope_status_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    if !state.config.conventional_status_codes
        && response.extensions().get::<ErrorEnvelope>().is_some()
    {
        *response.status_mut() = StatusCode::OK;
    }

    response
}
