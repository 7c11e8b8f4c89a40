//! Firestore document store over the REST API.
//!
//! Records are converted to and from Firestore's typed value encoding
//! (`stringValue`, `integerValue`, `mapValue`, ...). Authentication is an
//! optional OAuth bearer token; obtaining it is left to the deployment.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::FirestoreConfig;
use crate::error::{ChromaError, ChromaResult, ErrorCode};
use crate::record::{Document, Record, RecordId};
use crate::store::DocumentStore;

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Firestore-backed document store.
pub struct FirestoreStore {
    client: Client,
    documents_url: Url,
    config: FirestoreConfig,
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    next_page_token: Option<String>,
}

impl FirestoreStore {
    /// Create a new Firestore store.
    pub fn new(config: FirestoreConfig) -> ChromaResult<Self> {
        if config.project_id.trim().is_empty() {
            return Err(ChromaError::Configuration(
                "Firestore project_id is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChromaError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut documents_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            ChromaError::Configuration(format!("Invalid Firestore base URL '{}': {}", base_url, e))
        })?;
        documents_url
            .path_segments_mut()
            .map_err(|_| {
                ChromaError::Configuration(format!("Invalid Firestore base URL '{}'", base_url))
            })?
            .pop_if_empty()
            .extend([
                "projects",
                config.project_id.as_str(),
                "databases",
                config.database.as_str(),
                "documents",
            ]);

        Ok(Self {
            client,
            documents_url,
            config,
        })
    }

    /// URL below the documents root. Each part is one percent-encoded path
    /// segment, so a `/` or `?` in an id cannot reach another resource.
    fn resource_url(&self, parts: &[&str]) -> Url {
        let mut url = self.documents_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(parts);
        }
        url
    }

    fn collection_url(&self, collection: &str) -> Url {
        self.resource_url(&[collection])
    }

    fn document_url(&self, collection: &str, id: &str) -> Url {
        self.resource_url(&[collection, id])
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> ChromaResult<Response> {
        self.authorize(request).send().await.map_err(|e| {
            ChromaError::persistence_with_code(
                format!("Failed to {}: {}", action, e),
                ErrorCode::StoreConnectionFailed,
            )
        })
    }

    /// Map a non-success response to a store error.
    async fn failure(response: Response, collection: &str, id: Option<&str>) -> ChromaError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::NOT_FOUND || body.contains("NOT_FOUND") {
            return match id {
                Some(id) => ChromaError::not_found(collection, id),
                None => ChromaError::from_http_status(404, &body),
            };
        }

        let code = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorCode::StorePermissionDenied,
            _ => ErrorCode::StoreOperationFailed,
        };
        ChromaError::persistence_with_code(format!("Firestore returned {}: {}", status, body), code)
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: Response) -> ChromaResult<T> {
        response
            .json()
            .await
            .map_err(|e| ChromaError::persistence(format!("Failed to parse Firestore response: {}", e)))
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn list(&self, collection: &str) -> ChromaResult<Vec<Record>> {
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.collection_url(collection))
                .query(&[("pageSize", self.config.page_size.to_string())]);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = self.send(request, "list documents").await?;
            if !response.status().is_success() {
                return Err(Self::failure(response, collection, None).await);
            }

            let page: ListResponse = Self::parse(response).await?;
            records.extend(page.documents.into_iter().map(decode_document));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(collection, count = records.len(), "Listed Firestore documents");
        Ok(records)
    }

    async fn get(&self, collection: &str, id: &str) -> ChromaResult<Option<Record>> {
        let response = self
            .send(self.client.get(self.document_url(collection, id)), "get document")
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::failure(response, collection, Some(id)).await);
        }

        let doc: FirestoreDocument = Self::parse(response).await?;
        Ok(Some(decode_document(doc)))
    }

    async fn create(&self, collection: &str, fields: Document) -> ChromaResult<RecordId> {
        let body = json!({ "fields": encode_fields(&fields) });
        let response = self
            .send(
                self.client.post(self.collection_url(collection)).json(&body),
                "create document",
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, collection, None).await);
        }

        let doc: FirestoreDocument = Self::parse(response).await?;
        Ok(document_id(&doc.name))
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> ChromaResult<()> {
        let mut query: Vec<(&str, String)> = vec![("currentDocument.exists", "true".to_string())];
        query.extend(
            fields
                .keys()
                .map(|k| ("updateMask.fieldPaths", field_path(k))),
        );

        let body = json!({ "fields": encode_fields(&fields) });
        let response = self
            .send(
                self.client
                    .patch(self.document_url(collection, id))
                    .query(&query)
                    .json(&body),
                "update document",
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, collection, Some(id)).await);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> ChromaResult<()> {
        let response = self
            .send(
                self.client
                    .delete(self.document_url(collection, id))
                    .query(&[("currentDocument.exists", "true")]),
                "delete document",
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response, collection, Some(id)).await);
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "firestore"
    }
}

/// Last path segment of a Firestore resource name.
fn document_id(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

/// Quote a field name for use in an update mask when it is not a plain identifier.
fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn decode_document(doc: FirestoreDocument) -> Record {
    let fields = doc
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect();
    Record::new(document_id(&doc.name), fields)
}

fn encode_fields(fields: &Document) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Encode a JSON value as a Firestore typed value.
pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or_default() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => {
            let fields: Map<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

/// Decode a Firestore typed value into plain JSON.
pub(crate) fn decode_value(value: &Value) -> Value {
    let Some(obj) = value.as_object() else {
        return Value::Null;
    };

    if let Some(s) = obj.get("stringValue") {
        return s.clone();
    }
    if let Some(b) = obj.get("booleanValue") {
        return b.clone();
    }
    if let Some(i) = obj.get("integerValue") {
        return match i {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or_else(|_| i.clone()),
            other => other.clone(),
        };
    }
    if let Some(d) = obj.get("doubleValue") {
        return d.clone();
    }
    if let Some(ts) = obj.get("timestampValue") {
        return ts.clone();
    }
    if let Some(r) = obj.get("referenceValue") {
        return r.clone();
    }
    if let Some(g) = obj.get("geoPointValue") {
        return g.clone();
    }
    if let Some(arr) = obj.get("arrayValue") {
        let values = arr
            .get("values")
            .and_then(Value::as_array)
            .map(|vs| vs.iter().map(decode_value).collect())
            .unwrap_or_default();
        return Value::Array(values);
    }
    if let Some(map) = obj.get("mapValue") {
        let fields = map
            .get("fields")
            .and_then(Value::as_object)
            .map(|fs| fs.iter().map(|(k, v)| (k.clone(), decode_value(v))).collect())
            .unwrap_or_default();
        return Value::Object(fields);
    }
    Value::Null
}
