//! Mutation gateway: the validating front door for every collection write.
//!
//! Writes are validated against the collection's rules, stamped, persisted,
//! and only then announced through the [`NotificationHub`]. A failed write
//! never produces a change event.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::collections::{CollectionCatalog, CollectionRules};
use crate::error::{ChromaError, ChromaResult, ErrorCode};
use crate::events::{ChangeEvent, NotificationHub};
use crate::record::{
    format_timestamp, next_update_timestamp, now, sanitize_payload, Record, RecordId, CREATED_AT,
    UPDATED_AT,
};
use crate::store::DocumentStore;

/// A write against one collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create { payload: Value },
    Update { id: String, payload: Value },
    Delete { id: String },
}

/// Validates, persists and announces collection writes.
pub struct MutationGateway {
    store: Arc<dyn DocumentStore>,
    catalog: CollectionCatalog,
    hub: Arc<NotificationHub>,
}

impl MutationGateway {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        catalog: CollectionCatalog,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            store,
            catalog,
            hub,
        }
    }

    pub fn catalog(&self) -> &CollectionCatalog {
        &self.catalog
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    /// Name of the backing document store.
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Apply one mutation and return the affected record's id.
    pub async fn mutate(&self, collection: &str, mutation: Mutation) -> ChromaResult<RecordId> {
        match mutation {
            Mutation::Create { payload } => self.create(collection, payload).await,
            Mutation::Update { id, payload } => {
                self.update(collection, &id, payload).await?;
                Ok(id)
            }
            Mutation::Delete { id } => {
                self.delete(collection, &id).await?;
                Ok(id)
            }
        }
    }

    /// All records in a collection.
    pub async fn list(&self, collection: &str) -> ChromaResult<Vec<Record>> {
        self.catalog.get(collection)?;
        self.store.list(collection).await
    }

    /// One record, or `NotFound`.
    pub async fn get(&self, collection: &str, id: &str) -> ChromaResult<Record> {
        self.catalog.get(collection)?;
        let id = check_id(id)?;
        self.store
            .get(collection, id)
            .await?
            .ok_or_else(|| ChromaError::not_found(collection, id))
    }

    /// Create a record. Emits `created` with the full stored record.
    #[instrument(skip(self, payload))]
    pub async fn create(&self, collection: &str, payload: Value) -> ChromaResult<RecordId> {
        let rules = self.rules(collection)?;
        let mut fields = sanitize_payload(payload)?;
        rules.validate(&fields)?;

        let stamp = format_timestamp(now());
        fields.insert(CREATED_AT.to_string(), Value::String(stamp.clone()));
        fields.insert(UPDATED_AT.to_string(), Value::String(stamp));

        let id = self.store.create(collection, fields.clone()).await?;
        info!(collection, id = %id, "Record created");

        let record = Record::new(id.clone(), fields);
        self.hub
            .publish(ChangeEvent::created(collection, record.into_document()))
            .await;
        Ok(id)
    }

    /// Merge fields into a record. Emits `updated` with the written fields plus `id`.
    ///
    /// The rules are checked against the merged record, so a partial update
    /// that leaves the record valid is accepted.
    #[instrument(skip(self, payload))]
    pub async fn update(&self, collection: &str, id: &str, payload: Value) -> ChromaResult<()> {
        let rules = self.rules(collection)?;
        let id = check_id(id)?;
        let mut fields = sanitize_payload(payload)?;

        let existing = self
            .store
            .get(collection, id)
            .await?
            .ok_or_else(|| ChromaError::not_found(collection, id))?;

        let mut merged = existing.fields.clone();
        merged.extend(fields.clone());
        rules.validate(&merged)?;

        let stamp = next_update_timestamp(existing.updated_at());
        fields.insert(UPDATED_AT.to_string(), Value::String(format_timestamp(stamp)));

        self.store.update(collection, id, fields.clone()).await?;
        debug!(collection, id, fields = fields.len(), "Record updated");

        self.hub
            .publish(ChangeEvent::updated(collection, id, fields))
            .await;
        Ok(())
    }

    /// Remove a record. Emits `deleted` with `{id}`.
    #[instrument(skip(self))]
    pub async fn delete(&self, collection: &str, id: &str) -> ChromaResult<()> {
        self.rules(collection)?;
        let id = check_id(id)?;

        self.store.delete(collection, id).await?;
        info!(collection, id, "Record deleted");

        self.hub.publish(ChangeEvent::deleted(collection, id)).await;
        Ok(())
    }

    fn rules(&self, collection: &str) -> ChromaResult<&CollectionRules> {
        self.catalog.get(collection)
    }
}

/// Ids are single path segments: no `/`, and never `.` or `..`.
fn check_id(id: &str) -> ChromaResult<&str> {
    let trimmed = id.trim();
    if trimmed.is_empty() || trimmed.contains('/') || trimmed == "." || trimmed == ".." {
        return Err(ChromaError::invalid_field(
            "id",
            ErrorCode::ValInvalidInput,
            "Invalid document ID",
        ));
    }
    Ok(trimmed)
}
