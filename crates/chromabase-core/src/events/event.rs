//! Change events emitted after successful mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::record::{format_timestamp, now, Document, ID};

/// Kind of mutation a change event describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// One successful mutation.
///
/// Fields are private and there are no setters: once built, an event is
/// only ever read or cloned.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    id: Uuid,
    collection: String,
    kind: ChangeKind,
    data: Document,
    timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    fn new(collection: impl Into<String>, kind: ChangeKind, data: Document) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection: collection.into(),
            kind,
            data,
            timestamp: now(),
        }
    }

    /// Event for a new record; `record` is the full stored record.
    pub fn created(collection: impl Into<String>, record: Document) -> Self {
        Self::new(collection, ChangeKind::Created, record)
    }

    /// Event for an update; `fields` are the fields that were written.
    pub fn updated(collection: impl Into<String>, id: &str, mut fields: Document) -> Self {
        fields.insert(ID.to_string(), id.into());
        Self::new(collection, ChangeKind::Updated, fields)
    }

    /// Event for a removed record. Carries only the identifier.
    pub fn deleted(collection: impl Into<String>, id: &str) -> Self {
        let mut data = Document::new();
        data.insert(ID.to_string(), id.into());
        Self::new(collection, ChangeKind::Deleted, data)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn data(&self) -> &Document {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn timestamp_iso(&self) -> String {
        format_timestamp(self.timestamp)
    }

    /// Identifier of the mutated record, if the data carries one.
    pub fn record_id(&self) -> Option<&str> {
        self.data.get(ID).and_then(|v| v.as_str())
    }

    /// Body POSTed to webhook subscribers.
    pub fn webhook_payload(&self) -> WebhookPayload {
        WebhookPayload {
            event: self.kind,
            collection: self.collection.clone(),
            data: self.data.clone(),
            timestamp: self.timestamp_iso(),
        }
    }

    /// Data of a live stream frame. The kind travels as the SSE event name.
    pub fn stream_payload(&self) -> StreamPayload {
        StreamPayload {
            collection: self.collection.clone(),
            data: self.data.clone(),
            timestamp: self.timestamp_iso(),
        }
    }
}

/// Webhook request body: `{event, collection, data, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: ChangeKind,
    pub collection: String,
    pub data: Document,
    pub timestamp: String,
}

/// Live stream frame data: `{collection, data, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPayload {
    pub collection: String,
    pub data: Document,
    pub timestamp: String,
}
