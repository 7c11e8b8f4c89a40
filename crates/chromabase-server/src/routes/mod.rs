//! Route definitions for the REST API.

mod collections;
mod health;
mod stream;
mod webhooks;

use axum::{
    body::Bytes,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/api/health", get(health::health_check))
        // Webhook registry
        .route(
            "/api/webhooks",
            get(webhooks::list_webhooks)
                .post(webhooks::register_webhook)
                .delete(webhooks::unregister_webhook),
        )
        // Live stream
        .route("/api/stream", get(stream::live_stream))
        // Collection CRUD
        .route(
            "/api/:collection",
            get(collections::list_records).post(collections::create_record),
        )
        .route(
            "/api/:collection/:id",
            get(collections::get_record)
                .put(collections::update_record)
                .delete(collections::delete_record),
        )
        .fallback(not_found)
        // Attach state
        .with_state(state)
}

/// Success envelope: `{"status":"success","data":...}`.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub status: &'static str,
    pub data: T,
}

pub fn success<T: Serialize>(data: T) -> Json<Success<T>> {
    Json(Success {
        status: "success",
        data,
    })
}

/// Parse a JSON request body. An empty body reads as `null`.
fn parse_body(body: &Bytes) -> ApiResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

pub use collections::*;
pub use health::*;
pub use stream::*;
pub use webhooks::*;
