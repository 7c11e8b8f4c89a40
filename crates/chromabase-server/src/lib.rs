//! chromabase-server - REST and live stream server for chromabase.
//!
//! This crate exposes the mutation gateway, the webhook registry and the live
//! change stream over HTTP.
//!
//! # Example
//!
//! ```ignore
//! use chromabase_server::{create_server, AppState};
//! use chromabase_core::ServiceConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let state = AppState::in_memory(ServiceConfig::default()).unwrap();
//!     let app = create_server(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{middleware as axum_middleware, Router};
use tower_http::trace::TraceLayer;

/// Create the server with all routes and middleware.
pub fn create_server(state: AppState) -> Router {
    routes::create_router(state.clone())
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::envelope_status_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors_layer())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}
