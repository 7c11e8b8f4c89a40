//! Schemaless records and the server-managed fields they carry.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ChromaError, ChromaResult};

/// A record's fields as stored in a collection.
pub type Document = Map<String, Value>;

/// Identifier assigned by the document store.
pub type RecordId = String;

/// Field holding the creation timestamp.
pub const CREATED_AT: &str = "created_at";
/// Field holding the last-update timestamp.
pub const UPDATED_AT: &str = "updated_at";
/// Field holding the record identifier in API payloads.
pub const ID: &str = "id";

/// A stored record: its identifier plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Document,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Document) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// The record as a single JSON object with `id` included.
    pub fn to_json(&self) -> Value {
        Value::Object(self.clone().into_document())
    }

    /// Fields plus `id`, as one map.
    pub fn into_document(self) -> Document {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert(ID.to_string(), Value::String(self.id));
        map.extend(self.fields);
        map
    }

    /// Parsed `updated_at`, if present and well formed.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.fields
            .get(UPDATED_AT)
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
    }

    /// Parsed `created_at`, if present and well formed.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.fields
            .get(CREATED_AT)
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
    }
}

/// Turn an incoming request body into a writable document.
///
/// Server-managed fields (`id`, `created_at`, `updated_at`) are discarded and
/// nested objects are dropped. Scalars and arrays are kept as-is.
pub fn sanitize_payload(payload: Value) -> ChromaResult<Document> {
    let map = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        _ => return Err(ChromaError::validation("Request body must be a JSON object")),
    };

    Ok(map
        .into_iter()
        .filter(|(key, value)| {
            !matches!(key.as_str(), ID | CREATED_AT | UPDATED_AT) && !value.is_object()
        })
        .collect())
}

/// Format a timestamp the way records store it: RFC 3339, milliseconds, `Z`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Current time truncated to the stored precision.
pub fn now() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

/// Next `updated_at` for a record last updated at `previous`.
///
/// Stored timestamps have millisecond precision, so two updates inside the
/// same millisecond would otherwise collide; the result is always strictly
/// later than `previous`.
pub fn next_update_timestamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let current = now();
    match previous {
        Some(prev) if current <= prev => truncate_millis(prev) + Duration::milliseconds(1),
        _ => current,
    }
}

fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    let millis = ts.timestamp_millis();
    DateTime::from_timestamp_millis(millis).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_strips_server_fields_and_nested_objects() {
        let doc = sanitize_payload(json!({
            "id": "spoofed",
            "name": "Ann",
            "created_at": "1999-01-01T00:00:00Z",
            "updated_at": "1999-01-01T00:00:00Z",
            "tags": ["a", "b"],
            "meta": {"nested": true},
            "value": 10
        }))
        .unwrap();

        assert_eq!(doc.len(), 3);
        assert_eq!(doc["name"], "Ann");
        assert_eq!(doc["tags"], json!(["a", "b"]));
        assert_eq!(doc["value"], 10);
    }

    #[test]
    fn test_sanitize_rejects_non_objects() {
        assert!(sanitize_payload(json!(["not", "an", "object"])).is_err());
        assert!(sanitize_payload(json!("text")).is_err());
        assert!(sanitize_payload(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_timestamp_round_trip_format() {
        let ts = now();
        let text = format_timestamp(ts);
        assert!(text.ends_with('Z'));
        assert_eq!(parse_timestamp(&text), Some(ts));
    }

    #[test]
    fn test_next_update_timestamp_strictly_increases() {
        let future = now() + Duration::seconds(60);
        let next = next_update_timestamp(Some(future));
        assert!(next > future);
        assert_eq!(next - future, Duration::milliseconds(1));

        let past = now() - Duration::seconds(60);
        assert!(next_update_timestamp(Some(past)) > past);
        assert!(next_update_timestamp(None) <= now());
    }

    #[test]
    fn test_record_json_includes_id() {
        let mut fields = Document::new();
        fields.insert("name".into(), json!("Acme"));
        let record = Record::new("c1", fields);

        let value = record.to_json();
        assert_eq!(value["id"], "c1");
        assert_eq!(value["name"], "Acme");
        assert_eq!(serde_json::to_value(&record).unwrap(), value);
    }
}
