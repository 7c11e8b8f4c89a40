//! Collection CRUD endpoints.
//!
//! One set of handlers serves every configured collection; the collection
//! name comes from the path and its rules from the gateway's catalog.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use super::{parse_body, success, Success};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: String,
}

/// List every record in a collection.
/// GET /api/:collection
pub async fn list_records(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> ApiResult<Json<Success<Vec<Value>>>> {
    let records = state.gateway.list(&collection).await?;
    Ok(success(records.iter().map(|r| r.to_json()).collect()))
}

/// Get one record.
/// GET /api/:collection/:id
pub async fn get_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<Json<Success<Value>>> {
    let record = state.gateway.get(&collection, &id).await?;
    Ok(success(record.to_json()))
}

/// Create a record.
/// POST /api/:collection
pub async fn create_record(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Success<IdResponse>>> {
    let payload = parse_body(&body)?;
    let id = state.gateway.create(&collection, payload).await?;
    Ok(success(IdResponse { id }))
}

/// Merge fields into a record.
/// PUT /api/:collection/:id
pub async fn update_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<Success<IdResponse>>> {
    let payload = parse_body(&body)?;
    state.gateway.update(&collection, &id, payload).await?;
    Ok(success(IdResponse { id }))
}

/// Delete a record.
/// DELETE /api/:collection/:id
pub async fn delete_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<Json<Success<Value>>> {
    state.gateway.delete(&collection, &id).await?;
    Ok(success(json!({ "deleted": true })))
}
