//! Configuration system for chromabase.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::collections::{default_collections, CollectionCatalog, CollectionRules};
use crate::error::{ChromaError, ChromaResult};

/// Firestore connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirestoreConfig {
    /// Google Cloud project id.
    pub project_id: String,
    /// Database id within the project.
    pub database: String,
    /// Override for the REST endpoint (emulators, tests).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// OAuth access token sent as a bearer token.
    #[serde(skip_serializing)]
    pub access_token: Option<SecretString>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Page size used when listing a collection.
    pub page_size: u32,
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database: "(default)".to_string(),
            base_url: None,
            access_token: None,
            timeout_secs: 10,
            page_size: 100,
        }
    }
}

/// Which document store backs the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process store; data is lost on restart.
    #[default]
    Memory,
    /// Google Cloud Firestore over REST.
    Firestore(FirestoreConfig),
}

/// Webhook delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Upper bound for a single delivery attempt, in milliseconds.
    pub timeout_ms: u64,
    /// Secret used to sign payloads (`X-ChromaBase-Signature`).
    #[serde(skip_serializing)]
    pub signing_secret: Option<SecretString>,
}

impl WebhookSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            signing_secret: None,
        }
    }
}

/// Live stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Frames buffered per subscriber. A subscriber that falls this far
    /// behind is disconnected.
    pub buffer: usize,
    /// Interval between SSE keep-alive comments, in seconds.
    pub keep_alive_secs: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            buffer: 64,
            keep_alive_secs: 15,
        }
    }
}

/// Main service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name reported by the health endpoint.
    pub service_name: String,
    /// Address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Document store backend.
    pub store: StoreConfig,
    /// Webhook delivery.
    pub webhooks: WebhookSettings,
    /// Live stream.
    pub stream: StreamSettings,
    /// Use 4xx/5xx status codes for error envelopes instead of always 200.
    pub conventional_status_codes: bool,
    /// Collection rule table.
    pub collections: Vec<CollectionRules>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "ChromaBase API".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            store: StoreConfig::default(),
            webhooks: WebhookSettings::default(),
            stream: StreamSettings::default(),
            conventional_status_codes: false,
            collections: default_collections(),
        }
    }
}

impl ServiceConfig {
    /// Default location of the config file (`~/.chromabase/config.toml`).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".chromabase"))
            .unwrap_or_else(|| PathBuf::from(".chromabase"))
            .join("config.toml")
    }

    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> ChromaResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ChromaError::Configuration(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ChromaError::Configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| ChromaError::Configuration(e.to_string())),
            _ => Err(ChromaError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables on top of defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Resolve configuration the way the server binary does.
    ///
    /// Reads the file named by `CHROMABASE_CONFIG`, or the default path when it
    /// exists, then applies environment overrides and validates the result.
    pub fn load() -> ChromaResult<Self> {
        let explicit = std::env::var("CHROMABASE_CONFIG").ok().map(PathBuf::from);
        let path = explicit.clone().or_else(|| {
            let default = Self::default_path();
            default.exists().then_some(default)
        });

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `CHROMABASE_*` / `FIRESTORE_*` environment overrides.
    ///
    /// Reads:
    /// - `CHROMABASE_SERVICE_NAME`, `CHROMABASE_HOST`, `CHROMABASE_PORT`
    /// - `CHROMABASE_STORE` (`memory` | `firestore`)
    /// - `FIRESTORE_PROJECT_ID`, `FIRESTORE_DATABASE`, `FIRESTORE_BASE_URL`,
    ///   `FIRESTORE_ACCESS_TOKEN`
    /// - `CHROMABASE_WEBHOOK_TIMEOUT_MS`, `CHROMABASE_WEBHOOK_SECRET`
    /// - `CHROMABASE_STREAM_BUFFER`
    /// - `CHROMABASE_STRICT_STATUS` (any value enables status codes)
    pub fn apply_env(&mut self) {
        if let Ok(name) = std::env::var("CHROMABASE_SERVICE_NAME") {
            self.service_name = name;
        }
        if let Ok(host) = std::env::var("CHROMABASE_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("CHROMABASE_PORT").or_else(|_| std::env::var("PORT")) {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!(value = %port, "Ignoring invalid port"),
            }
        }

        let project = std::env::var("FIRESTORE_PROJECT_ID").ok();
        let use_firestore = match std::env::var("CHROMABASE_STORE").ok().as_deref() {
            Some("memory") => {
                self.store = StoreConfig::Memory;
                false
            }
            Some("firestore") => true,
            Some(other) => {
                warn!(value = other, "Ignoring unknown CHROMABASE_STORE");
                false
            }
            // A project id on its own selects Firestore.
            None => project.is_some(),
        };
        if use_firestore && matches!(self.store, StoreConfig::Memory) {
            self.store = StoreConfig::Firestore(FirestoreConfig::default());
        }

        if let StoreConfig::Firestore(firestore) = &mut self.store {
            if let Some(project) = project {
                firestore.project_id = project;
            }
            if let Ok(db) = std::env::var("FIRESTORE_DATABASE") {
                firestore.database = db;
            }
            if let Ok(url) = std::env::var("FIRESTORE_BASE_URL") {
                firestore.base_url = Some(url);
            }
            if let Ok(token) = std::env::var("FIRESTORE_ACCESS_TOKEN") {
                firestore.access_token = Some(SecretString::new(token));
            }
        }

        if let Ok(timeout) = std::env::var("CHROMABASE_WEBHOOK_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => self.webhooks.timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring invalid webhook timeout"),
            }
        }
        if let Ok(secret) = std::env::var("CHROMABASE_WEBHOOK_SECRET") {
            self.webhooks.signing_secret = Some(SecretString::new(secret));
        }
        if let Ok(buffer) = std::env::var("CHROMABASE_STREAM_BUFFER") {
            match buffer.parse() {
                Ok(n) => self.stream.buffer = n,
                Err(_) => warn!(value = %buffer, "Ignoring invalid stream buffer"),
            }
        }
        if std::env::var("CHROMABASE_STRICT_STATUS").is_ok() {
            self.conventional_status_codes = true;
        }
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> ChromaResult<()> {
        if self.webhooks.timeout_ms == 0 {
            return Err(ChromaError::Configuration(
                "webhooks.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.stream.buffer == 0 {
            return Err(ChromaError::Configuration(
                "stream.buffer must be greater than zero".to_string(),
            ));
        }
        if self.stream.keep_alive_secs == 0 {
            return Err(ChromaError::Configuration(
                "stream.keep_alive_secs must be greater than zero".to_string(),
            ));
        }
        if let StoreConfig::Firestore(f) = &self.store {
            if f.project_id.trim().is_empty() {
                return Err(ChromaError::Configuration(
                    "store.project_id is required for the firestore provider".to_string(),
                ));
            }
        }
        self.catalog().map(|_| ())
    }

    /// Build the collection catalog from the rule table.
    pub fn catalog(&self) -> ChromaResult<CollectionCatalog> {
        CollectionCatalog::new(self.collections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.webhooks.timeout(), Duration::from_secs(5));
        assert!(matches!(config.store, StoreConfig::Memory));
        assert!(!config.conventional_status_codes);
        assert_eq!(config.catalog().unwrap().names().count(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_file_with_custom_collection() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
port = 8088
conventional_status_codes = true

[store]
provider = "firestore"
project_id = "chromabase-test"

[webhooks]
timeout_ms = 1500

[[collections]]
name = "invoices"
label = "Invoice"
required = ["number", "client_id"]
non_negative = ["amount"]
"#
        )
        .unwrap();

        let config = ServiceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 8088);
        assert!(config.conventional_status_codes);
        assert_eq!(config.webhooks.timeout_ms, 1500);
        match &config.store {
            StoreConfig::Firestore(f) => {
                assert_eq!(f.project_id, "chromabase-test");
                assert_eq!(f.database, "(default)");
            }
            other => panic!("unexpected store {:?}", other),
        }

        let catalog = config.catalog().unwrap();
        assert!(catalog.contains("invoices"));
        assert!(!catalog.contains("clients"));
    }

    #[test]
    fn test_from_json_and_yaml() {
        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(json, r#"{{"service_name": "Test API", "stream": {{"buffer": 8}}}}"#).unwrap();
        let config = ServiceConfig::from_file(json.path()).unwrap();
        assert_eq!(config.service_name, "Test API");
        assert_eq!(config.stream.buffer, 8);
        assert_eq!(config.stream.keep_alive_secs, 15);

        let mut yaml = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(yaml, "host: 127.0.0.1\nport: 9000\n").unwrap();
        let config = ServiceConfig::from_file(yaml.path()).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            ServiceConfig::from_file(file.path()),
            Err(ChromaError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServiceConfig::default();
        config.webhooks.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.stream.buffer = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.stream.keep_alive_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ChromaError::Configuration(msg)) if msg.contains("keep_alive_secs")
        ));

        let config = ServiceConfig {
            store: StoreConfig::Firestore(FirestoreConfig::default()),
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
