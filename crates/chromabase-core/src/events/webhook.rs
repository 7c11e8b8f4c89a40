//! Webhook registry and delivery.
//!
//! Delivers change events to external endpoints with:
//! - one timeout-bounded POST per registered URL, queued on that URL's lane
//! - optional HMAC-SHA256 payload signing for verification
//! - no retries; failures are logged and reported, never raised

use futures::future::join_all;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::WebhookSettings;
use crate::error::{ChromaError, ChromaResult, ErrorCode};
use crate::events::ChangeEvent;

/// Header carrying the event kind (`created`, `updated`, `deleted`).
pub const EVENT_HEADER: &str = "X-ChromaBase-Event";
/// Header carrying a unique id per delivery attempt.
pub const DELIVERY_HEADER: &str = "X-ChromaBase-Delivery";
/// Header carrying `sha256=<hex>` when a signing secret is configured.
pub const SIGNATURE_HEADER: &str = "X-ChromaBase-Signature";

/// Subscriber URLs per collection.
///
/// Registration order is kept and duplicates are allowed: registering the
/// same URL twice means it is called twice per event.
#[derive(Default)]
pub struct WebhookRegistry {
    subscriptions: RwLock<BTreeMap<String, Vec<String>>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with an empty sequence for each known collection.
    pub fn with_collections<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let subscriptions = collections
            .into_iter()
            .map(|c| (c.into(), Vec::new()))
            .collect();
        Self {
            subscriptions: RwLock::new(subscriptions),
        }
    }

    /// Append `url` to the collection's subscribers.
    ///
    /// Returns how many URLs the collection has afterwards.
    pub async fn register(&self, collection: &str, url: &str) -> ChromaResult<usize> {
        let collection = collection.trim();
        if collection.is_empty() {
            return Err(ChromaError::invalid_field(
                "collection",
                ErrorCode::ValMissingField,
                "Collection is required",
            ));
        }
        validate_url(url)?;

        let mut subscriptions = self.subscriptions.write().await;
        let urls = subscriptions.entry(collection.to_string()).or_default();
        urls.push(url.to_string());
        info!(collection, url, count = urls.len(), "Webhook registered");
        Ok(urls.len())
    }

    /// Remove every exact occurrence of `url`. Returns how many were removed.
    pub async fn unregister(&self, collection: &str, url: &str) -> usize {
        let mut subscriptions = self.subscriptions.write().await;
        let Some(urls) = subscriptions.get_mut(collection) else {
            return 0;
        };
        let before = urls.len();
        urls.retain(|u| u != url);
        let removed = before - urls.len();
        if removed > 0 {
            info!(collection, url, removed, "Webhook unregistered");
        }
        removed
    }

    /// Snapshot of the whole registry.
    pub async fn list(&self) -> BTreeMap<String, Vec<String>> {
        self.subscriptions.read().await.clone()
    }

    /// Snapshot of one collection's subscribers.
    pub async fn targets(&self, collection: &str) -> Vec<String> {
        self.subscriptions
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Subscriber count per collection.
    pub async fn counts(&self) -> BTreeMap<String, usize> {
        self.subscriptions
            .read()
            .await
            .iter()
            .map(|(c, urls)| (c.clone(), urls.len()))
            .collect()
    }
}

fn validate_url(raw: &str) -> ChromaResult<()> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ChromaError::invalid_field(
            "url",
            ErrorCode::ValMissingField,
            "URL is required",
        ));
    }
    let parsed = Url::parse(raw).map_err(|_| {
        ChromaError::invalid_field("url", ErrorCode::ValInvalidFormat, "Invalid webhook URL")
    })?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ChromaError::invalid_field(
            "url",
            ErrorCode::ValInvalidFormat,
            "Webhook URL must be an absolute http or https URL",
        ));
    }
    Ok(())
}

/// Sends one event to one URL.
#[derive(Clone)]
pub struct WebhookDelivery {
    client: Client,
    secret: Option<SecretString>,
}

impl WebhookDelivery {
    /// Create a delivery client; every attempt is bounded by the configured timeout.
    pub fn new(settings: &WebhookSettings) -> ChromaResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| ChromaError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            secret: settings.signing_secret.clone(),
        })
    }

    /// Deliver a single event to `url`.
    pub async fn deliver(&self, url: &str, event: &ChangeEvent) -> ChromaResult<()> {
        let payload = serde_json::to_string(&event.webhook_payload())?;
        let signature = self.sign_payload(&payload);
        self.post(url, event, payload, signature.as_deref()).await
    }

    async fn post(
        &self,
        url: &str,
        event: &ChangeEvent,
        payload: String,
        signature: Option<&str>,
    ) -> ChromaResult<()> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(EVENT_HEADER, event.kind().as_str())
            .header(DELIVERY_HEADER, uuid::Uuid::new_v4().to_string())
            .body(payload);
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.send().await.map_err(|e| {
            let code = if e.is_timeout() {
                ErrorCode::HookTimeout
            } else {
                ErrorCode::HookNetwork
            };
            ChromaError::delivery(url, code, e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ChromaError::delivery(
                url,
                ErrorCode::HookRejected,
                format!("endpoint returned {}", status),
            ))
        }
    }

    /// Sign payload with HMAC-SHA256, if a secret is configured.
    pub fn sign_payload(&self, payload: &str) -> Option<String> {
        self.secret
            .as_ref()
            .map(|secret| signature_for(payload, secret.expose_secret()))
    }
}

fn signature_for(payload: &str, secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a `sha256=<hex>` webhook signature.
///
/// Used by webhook receivers to check a payload was sent by this service.
pub fn verify_signature(payload: &str, secret: &str, signature: &str) -> bool {
    let Some(digest) = signature
        .strip_prefix("sha256=")
        .and_then(|hex_digest| hex::decode(hex_digest).ok())
    else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload.as_bytes());
    mac.verify_slice(&digest).is_ok()
}

/// Outcome of delivering one event to its targets.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failures: Vec<ChromaError>,
}

/// One queued attempt on a URL's lane.
struct LaneJob {
    event: Arc<ChangeEvent>,
    payload: Arc<str>,
    signature: Option<Arc<str>>,
}

/// Fans change events out to registered webhooks.
///
/// Every target URL gets its own FIFO lane served by its own task. A
/// sequential caller's events reach each URL in emission order, while a slow
/// or hanging URL only backs up its own lane.
pub struct WebhookDispatcher {
    registry: Arc<WebhookRegistry>,
    delivery: WebhookDelivery,
    lanes: Mutex<Option<HashMap<String, mpsc::UnboundedSender<LaneJob>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WebhookDispatcher {
    pub fn new(registry: Arc<WebhookRegistry>, settings: &WebhookSettings) -> ChromaResult<Self> {
        Ok(Self {
            registry,
            delivery: WebhookDelivery::new(settings)?,
            lanes: Mutex::new(Some(HashMap::new())),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Queue `event` for every URL currently registered for its collection.
    ///
    /// The target list is snapshotted here. Returns the number of attempts
    /// queued; never waits for delivery. Must be called from within a tokio
    /// runtime.
    pub async fn dispatch(&self, event: &ChangeEvent) -> usize {
        let targets = self.registry.targets(event.collection()).await;
        if targets.is_empty() {
            return 0;
        }

        let payload: Arc<str> = match serde_json::to_string(&event.webhook_payload()) {
            Ok(payload) => payload.into(),
            Err(e) => {
                warn!(event_id = %event.id(), error = %e, "Failed to serialize webhook payload");
                return 0;
            }
        };
        let signature: Option<Arc<str>> = self.delivery.sign_payload(&payload).map(Into::into);
        let event = Arc::new(event.clone());

        let mut lanes = self.lanes.lock().unwrap_or_else(|e| e.into_inner());
        let Some(lanes) = lanes.as_mut() else {
            warn!(event_id = %event.id(), "Webhook dispatcher closed, dropping event");
            return 0;
        };

        let mut queued = 0;
        for url in targets {
            let job = LaneJob {
                event: event.clone(),
                payload: payload.clone(),
                signature: signature.clone(),
            };
            let lane = lanes
                .entry(url.clone())
                .or_insert_with(|| self.open_lane(&url));
            if lane.send(job).is_ok() {
                queued += 1;
            } else {
                warn!(url = %url, event_id = %event.id(), "Webhook lane stopped, dropping attempt");
            }
        }
        queued
    }

    fn open_lane(&self, url: &str) -> mpsc::UnboundedSender<LaneJob> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<LaneJob>();
        let delivery = self.delivery.clone();
        let url = url.to_string();
        debug!(url = %url, "Opening webhook lane");

        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                let result = delivery
                    .post(&url, &job.event, job.payload.to_string(), job.signature.as_deref())
                    .await;
                if let Err(e) = result {
                    warn!(
                        url = %url,
                        event_id = %job.event.id(),
                        code = e.code().as_str(),
                        error = %e,
                        "Webhook delivery failed"
                    );
                }
            }
            debug!(url = %url, "Webhook lane stopped");
        });
        self.workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(worker);
        sender
    }

    /// Number of URLs with an open lane.
    pub fn lane_count(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(0, HashMap::len)
    }

    /// Deliver `event` to `targets` right away and wait for every attempt.
    pub async fn deliver_now(&self, event: &ChangeEvent, targets: &[String]) -> DispatchReport {
        deliver_all(&self.delivery, event, targets).await
    }

    /// Stop accepting events. Lanes finish what is queued, then exit.
    pub fn close(&self) {
        self.lanes.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Close, then wait for every lane to drain.
    pub async fn shutdown(&self) {
        self.close();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Webhook lane ended abnormally");
            }
        }
    }
}

async fn deliver_all(
    delivery: &WebhookDelivery,
    event: &ChangeEvent,
    targets: &[String],
) -> DispatchReport {
    let mut report = DispatchReport {
        attempted: targets.len(),
        ..DispatchReport::default()
    };
    if targets.is_empty() {
        return report;
    }

    let payload = match serde_json::to_string(&event.webhook_payload()) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(event_id = %event.id(), error = %e, "Failed to serialize webhook payload");
            report.failures.push(e.into());
            return report;
        }
    };
    let signature = delivery.sign_payload(&payload);

    let attempts = targets.iter().map(|url| {
        let payload = payload.clone();
        let signature = signature.as_deref();
        async move {
            delivery
                .post(url, event, payload, signature)
                .await
                .map_err(|e| {
                    warn!(
                        url = %url,
                        event_id = %event.id(),
                        code = e.code().as_str(),
                        error = %e,
                        "Webhook delivery failed"
                    );
                    e
                })
        }
    });

    for result in join_all(attempts).await {
        match result {
            Ok(()) => report.delivered += 1,
            Err(e) => report.failures.push(e),
        }
    }

    debug!(
        event_id = %event.id(),
        collection = event.collection(),
        attempted = report.attempted,
        delivered = report.delivered,
        "Webhook fan-out complete"
    );
    report
}
