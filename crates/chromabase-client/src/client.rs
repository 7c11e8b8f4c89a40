//! HTTP client for a running chromabase server.

use std::collections::BTreeMap;
use std::time::Duration;

use chromabase_core::error::{ChromaError, ChromaResult, ErrorCode};
use chromabase_core::models::{CollectionRecord, Stored};

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Client for the chromabase HTTP API.
#[derive(Debug, Clone)]
pub struct ChromaClient {
    client: Client,
    base_url: String,
}

/// Response envelope used by every `/api` route except health.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum Envelope<T> {
    Success {
        data: T,
    },
    Error {
        message: String,
        #[serde(default)]
        code: String,
    },
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

/// Service health as reported by `GET /api/health`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub timestamp: String,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub stats: Value,
}

/// Result of registering a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookRegistration {
    pub collection: String,
    pub url: String,
    /// Number of registrations for the collection after this one.
    pub count: usize,
}

/// Result of unregistering a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookChange {
    pub collection: String,
    pub url: String,
    pub removed: usize,
}

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    url: &'a str,
    collection: &'a str,
}

/// Rebuild a core error from an error envelope.
fn envelope_error(code: &str, message: String, collection: &str, id: Option<&str>) -> ChromaError {
    match code {
        "VAL_005" => ChromaError::unknown_collection(collection),
        "STORE_001" => ChromaError::not_found(collection, id.unwrap_or_default()),
        "STORE_004" => ChromaError::persistence_with_code(message, ErrorCode::StorePermissionDenied),
        c if c.starts_with("VAL_") => ChromaError::validation(message),
        c if c.starts_with("STORE_") => ChromaError::persistence(message),
        c if c.starts_with("NET_") => ChromaError::network(message),
        _ => ChromaError::Internal(message),
    }
}

impl ChromaClient {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: &str) -> ChromaResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a client with an explicit request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> ChromaResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from `CHROMABASE_URL`, defaulting to localhost.
    pub fn from_env() -> ChromaResult<Self> {
        let base_url =
            std::env::var("CHROMABASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(&base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/api/{}", self.base_url, path))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        collection: &str,
        id: Option<&str>,
    ) -> ChromaResult<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), collection, "API response");

        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(Envelope::Success { data }) => Ok(data),
            Ok(Envelope::Error { message, code }) => {
                Err(envelope_error(&code, message, collection, id))
            }
            Err(_) if !status.is_success() => {
                Err(ChromaError::from_http_status(status.as_u16(), &body))
            }
            Err(e) => Err(ChromaError::Internal(format!(
                "Failed to parse response: {}",
                e
            ))),
        }
    }

    /// Service health and fan-out stats.
    pub async fn health(&self) -> ChromaResult<HealthStatus> {
        let response = self.request(Method::GET, "health").send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChromaError::from_http_status(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ChromaError::Internal(format!("Failed to parse response: {}", e)))
    }

    /// List every record in `T`'s collection.
    pub async fn list<T: CollectionRecord>(&self) -> ChromaResult<Vec<Stored<T>>> {
        self.call(self.request(Method::GET, T::COLLECTION), T::COLLECTION, None)
            .await
    }

    /// Fetch one record.
    pub async fn get<T: CollectionRecord>(&self, id: &str) -> ChromaResult<Stored<T>> {
        let path = format!("{}/{}", T::COLLECTION, id);
        self.call(self.request(Method::GET, &path), T::COLLECTION, Some(id))
            .await
    }

    /// Create a record and return its id.
    pub async fn create<T: CollectionRecord>(&self, record: &T) -> ChromaResult<String> {
        let created: IdResponse = self
            .call(
                self.request(Method::POST, T::COLLECTION).json(record),
                T::COLLECTION,
                None,
            )
            .await?;
        Ok(created.id)
    }

    /// Apply a partial update to a record.
    ///
    /// `patch` holds only the fields to change; the server merges it over the
    /// stored record.
    pub async fn update<T: CollectionRecord>(
        &self,
        id: &str,
        patch: &impl Serialize,
    ) -> ChromaResult<()> {
        let path = format!("{}/{}", T::COLLECTION, id);
        let _: IdResponse = self
            .call(
                self.request(Method::PUT, &path).json(patch),
                T::COLLECTION,
                Some(id),
            )
            .await?;
        Ok(())
    }

    /// Delete a record.
    pub async fn delete<T: CollectionRecord>(&self, id: &str) -> ChromaResult<()> {
        let path = format!("{}/{}", T::COLLECTION, id);
        let _: Value = self
            .call(self.request(Method::DELETE, &path), T::COLLECTION, Some(id))
            .await?;
        Ok(())
    }

    /// Register `url` to receive changes for `collection`.
    pub async fn register_webhook(
        &self,
        collection: &str,
        url: &str,
    ) -> ChromaResult<WebhookRegistration> {
        let body = WebhookBody { url, collection };
        self.call(
            self.request(Method::POST, "webhooks").json(&body),
            collection,
            None,
        )
        .await
    }

    /// Registered webhook URLs keyed by collection.
    pub async fn list_webhooks(&self) -> ChromaResult<BTreeMap<String, Vec<String>>> {
        self.call(self.request(Method::GET, "webhooks"), "webhooks", None)
            .await
    }

    /// Remove every registration of `url` for `collection`.
    pub async fn unregister_webhook(
        &self,
        collection: &str,
        url: &str,
    ) -> ChromaResult<WebhookChange> {
        self.call(
            self.request(Method::DELETE, "webhooks")
                .json(&json!({"url": url, "collection": collection})),
            collection,
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chromabase_core::models::Lead;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ChromaClient {
        ChromaClient::new(&format!("{}/", server.uri())).unwrap()
    }

    #[test]
    fn test_base_url_is_trimmed() {
        let client = ChromaClient::new("http://localhost:3000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000");
    }

    #[test]
    fn test_envelope_error_mapping() {
        let err = envelope_error("VAL_003", "Invalid email format".into(), "leads", None);
        assert!(matches!(err, ChromaError::Validation { .. }));
        assert_eq!(err.to_string(), "Invalid email format");

        let err = envelope_error("STORE_001", "Not found".into(), "leads", Some("x"));
        assert!(err.is_not_found());

        let err = envelope_error("VAL_005", "Unknown collection: w".into(), "w", None);
        assert_eq!(err.to_string(), "Unknown collection: w");
    }

    #[tokio::test]
    async fn test_get_lead() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/leads/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {
                    "id": "abc",
                    "name": "Ann",
                    "email": "ann@x.com",
                    "pipeline_stage": "New",
                    "created_at": "2024-05-01T10:00:00.000Z",
                    "updated_at": "2024-05-01T10:00:00.000Z"
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let lead = client.get::<Lead>("abc").await.unwrap();
        assert_eq!(lead.id, "abc");
        assert_eq!(lead.record.name, "Ann");
        assert_eq!(lead.record.pipeline_stage, "New");
    }

    #[tokio::test]
    async fn test_error_envelope_with_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/leads/missing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "message": "Not found",
                "code": "STORE_001"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.get::<Lead>("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_non_envelope_failure_uses_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.delete::<Lead>("abc").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::StorePermissionDenied);
    }

    #[tokio::test]
    async fn test_register_webhook_sends_collection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/webhooks"))
            .and(body_json(json!({"url": "http://h/x", "collection": "leads"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"collection": "leads", "url": "http://h/x", "count": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let registration = client.register_webhook("leads", "http://h/x").await.unwrap();
        assert_eq!(registration.count, 1);
        assert_eq!(registration.collection, "leads");
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "service": "ChromaBase API",
                "timestamp": "2024-05-01T10:00:00.000Z",
                "store": "memory",
                "stats": {"live_subscribers": 2, "webhooks": {}}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let health = client.health().await.unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.store.as_deref(), Some("memory"));
        assert_eq!(health.stats["live_subscribers"], 2);
    }
}
