//! Webhook registry endpoints.

use std::collections::BTreeMap;

use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};

use super::{parse_body, success, Success};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Collection used when a registration names none.
pub const DEFAULT_WEBHOOK_COLLECTION: &str = "clients";

/// Request body for registering or removing a webhook.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookRequest {
    pub url: Option<String>,
    pub collection: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub collection: String,
    pub url: String,
    /// Subscribers the collection has after this registration.
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct UnregisterResponse {
    pub collection: String,
    pub url: String,
    pub removed: usize,
}

fn parse_request(body: &Bytes) -> ApiResult<WebhookRequest> {
    let value = parse_body(body)?;
    if value.is_null() {
        return Ok(WebhookRequest::default());
    }
    serde_json::from_value(value).map_err(|e| ApiError::bad_request(e.to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Register a webhook.
/// POST /api/webhooks
pub async fn register_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Success<RegisterResponse>>> {
    let request = parse_request(&body)?;
    let url = non_blank(request.url).ok_or_else(|| ApiError::bad_request("URL required"))?;
    let collection = non_blank(request.collection)
        .unwrap_or_else(|| DEFAULT_WEBHOOK_COLLECTION.to_string());
    // A registration for an unknown collection would never fire.
    state.gateway.catalog().get(&collection)?;

    let count = state.hub.registry().register(&collection, &url).await?;
    Ok(success(RegisterResponse {
        collection,
        url,
        count,
    }))
}

/// Snapshot of every registered webhook.
/// GET /api/webhooks
pub async fn list_webhooks(
    State(state): State<AppState>,
) -> Json<Success<BTreeMap<String, Vec<String>>>> {
    success(state.hub.registry().list().await)
}

/// Remove a webhook.
/// DELETE /api/webhooks
pub async fn unregister_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Success<UnregisterResponse>>> {
    let request = parse_request(&body)?;
    let (Some(url), Some(collection)) = (non_blank(request.url), non_blank(request.collection))
    else {
        return Err(ApiError::bad_request("URL and collection required"));
    };

    let removed = state.hub.registry().unregister(&collection, &url).await;
    Ok(success(UnregisterResponse {
        collection,
        url,
        removed,
    }))
}
