//! The notification hub: one object owning the webhook registry, the
//! webhook dispatcher and the live broadcaster.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ServiceConfig;
use crate::error::ChromaResult;
use crate::events::{
    BroadcastReport, ChangeEvent, LiveBroadcaster, SubscriberHandle, WebhookDispatcher,
    WebhookRegistry,
};

/// What happened to one published event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Webhook attempts queued.
    pub webhook_attempts: usize,
    pub live: BroadcastReport,
}

/// Point-in-time fan-out counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub live_subscribers: usize,
    pub webhooks: BTreeMap<String, usize>,
}

/// Fans change events out to webhooks and live subscribers.
///
/// Built once at startup and shared behind an `Arc`.
pub struct NotificationHub {
    registry: Arc<WebhookRegistry>,
    dispatcher: WebhookDispatcher,
    broadcaster: LiveBroadcaster,
}

impl NotificationHub {
    /// Build a hub; the registry starts with every configured collection.
    pub fn new(config: &ServiceConfig) -> ChromaResult<Self> {
        let catalog = config.catalog()?;
        let registry = Arc::new(WebhookRegistry::with_collections(catalog.names()));
        let dispatcher = WebhookDispatcher::new(registry.clone(), &config.webhooks)?;

        Ok(Self {
            registry,
            dispatcher,
            broadcaster: LiveBroadcaster::new(config.stream.buffer),
        })
    }

    /// Hand `event` to both fan-out paths. Returns without waiting for delivery.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn publish(&self, event: ChangeEvent) -> PublishReport {
        let webhook_attempts = self.dispatcher.dispatch(&event).await;
        let live = self.broadcaster.broadcast(&event);

        debug!(
            event_id = %event.id(),
            collection = event.collection(),
            kind = %event.kind(),
            webhook_attempts,
            live_delivered = live.delivered,
            "Change event published"
        );
        PublishReport {
            webhook_attempts,
            live,
        }
    }

    pub fn registry(&self) -> &WebhookRegistry {
        &self.registry
    }

    pub fn broadcaster(&self) -> &LiveBroadcaster {
        &self.broadcaster
    }

    /// Open a live subscriber.
    pub fn subscribe(&self) -> ChromaResult<SubscriberHandle> {
        self.broadcaster.subscribe()
    }

    pub async fn stats(&self) -> HubStats {
        HubStats {
            live_subscribers: self.broadcaster.subscriber_count(),
            webhooks: self.registry.counts().await,
        }
    }

    /// Close live subscribers, then let every webhook lane drain.
    pub async fn shutdown(&self) {
        let closed = self.broadcaster.close_all();
        self.dispatcher.shutdown().await;
        info!(live_subscribers_closed = closed, "Notification hub stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Document;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_created() -> ChangeEvent {
        let mut record = Document::new();
        record.insert("id".into(), json!("c1"));
        record.insert("name".into(), json!("Acme"));
        ChangeEvent::created("clients", record)
    }

    #[tokio::test]
    async fn test_registry_seeded_with_collections() {
        let hub = NotificationHub::new(&ServiceConfig::default()).unwrap();
        let stats = hub.stats().await;
        assert_eq!(stats.live_subscribers, 0);
        assert_eq!(stats.webhooks.len(), 5);
        assert!(stats.webhooks.values().all(|&n| n == 0));
    }

    #[tokio::test]
    async fn test_publish_reaches_webhooks_and_live_subscribers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let hub = NotificationHub::new(&ServiceConfig::default()).unwrap();
        hub.registry()
            .register("clients", &format!("{}/x", server.uri()))
            .await
            .unwrap();
        let mut sub = hub.subscribe().unwrap();
        sub.recv().await.unwrap();

        let report = hub.publish(client_created()).await;
        assert_eq!(report.webhook_attempts, 1);
        assert_eq!(report.live.delivered, 1);
        assert_eq!(sub.recv().await.unwrap().event(), "created");

        hub.shutdown().await;
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_events_for_other_collections_skip_webhooks() {
        let hub = NotificationHub::new(&ServiceConfig::default()).unwrap();
        hub.registry()
            .register("leads", "http://127.0.0.1:1/hook")
            .await
            .unwrap();

        let report = hub.publish(client_created()).await;
        assert_eq!(report.webhook_attempts, 0);
    }
}
