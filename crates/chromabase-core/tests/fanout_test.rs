//! Integration tests for the mutation gateway and change fan-out.
//!
//! Drives the public API end to end: writes go through the gateway, webhook
//! deliveries land on a wiremock server, live frames are read from
//! subscriber handles.

use chromabase_core::{
    ChangeKind, MemoryDocumentStore, MutationGateway, NotificationHub, ServiceConfig,
    WebhookPayload,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn setup() -> (MutationGateway, Arc<NotificationHub>) {
    let config = ServiceConfig::default();
    let hub = Arc::new(NotificationHub::new(&config).unwrap());
    let gateway = MutationGateway::new(
        Arc::new(MemoryDocumentStore::new()),
        config.catalog().unwrap(),
        hub.clone(),
    );
    (gateway, hub)
}

/// Registered webhook receives exactly one POST for a created client.
#[tokio::test]
async fn test_webhook_receives_created_client() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/x"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (gateway, hub) = setup();
    let count = hub
        .registry()
        .register("clients", &format!("{}/x", server.uri()))
        .await
        .unwrap();
    assert_eq!(count, 1);

    let id = gateway
        .create(
            "clients",
            json!({"name": "Acme", "email": "ops@acme.io", "status": "active"}),
        )
        .await
        .unwrap();

    // Drains the webhook queue.
    hub.shutdown().await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let payload: WebhookPayload = requests[0].body_json().unwrap();
    assert_eq!(payload.event, ChangeKind::Created);
    assert_eq!(payload.collection, "clients");
    assert_eq!(payload.data["id"], id.as_str());
    assert_eq!(payload.data["name"], "Acme");
}

/// Failed validation produces neither a webhook call nor a broadcast.
#[tokio::test]
async fn test_invalid_lead_fires_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (gateway, hub) = setup();
    hub.registry()
        .register("leads", &format!("{}/leads", server.uri()))
        .await
        .unwrap();
    let mut sub = hub.subscribe().unwrap();
    sub.recv().await.unwrap();

    let err = gateway
        .create(
            "leads",
            json!({"name": "Ann", "email": "bad-email", "pipeline_stage": "New"}),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid email format");

    hub.shutdown().await;
    assert!(sub.recv().await.is_none());
}

/// Sequential writes from one caller reach a webhook in order.
#[tokio::test]
async fn test_sequential_events_arrive_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (gateway, hub) = setup();
    hub.registry()
        .register("leads", &format!("{}/hook", server.uri()))
        .await
        .unwrap();

    let id = gateway
        .create(
            "leads",
            json!({"name": "Ann", "email": "ann@x.com", "pipeline_stage": "New"}),
        )
        .await
        .unwrap();
    gateway
        .update("leads", &id, json!({"pipeline_stage": "Won"}))
        .await
        .unwrap();
    gateway.delete("leads", &id).await.unwrap();
    hub.shutdown().await;

    let kinds: Vec<ChangeKind> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.body_json::<WebhookPayload>().unwrap().event)
        .collect();
    assert_eq!(
        kinds,
        vec![ChangeKind::Created, ChangeKind::Updated, ChangeKind::Deleted]
    );
}

/// A subscriber sees events broadcast while connected, and nothing after.
#[tokio::test]
async fn test_live_subscriber_window() {
    let (gateway, hub) = setup();
    let id = gateway
        .create(
            "deliverables",
            json!({"name": "Audit", "client_id": "c1", "status": "Pending"}),
        )
        .await
        .unwrap();

    let mut first = hub.subscribe().unwrap();
    let mut second = hub.subscribe().unwrap();
    assert_eq!(first.recv().await.unwrap().event(), "connected");
    assert_eq!(second.recv().await.unwrap().event(), "connected");

    gateway
        .update("deliverables", &id, json!({"status": "In Progress"}))
        .await
        .unwrap();
    let a = first.recv().await.unwrap();
    let b = second.recv().await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.event(), "updated");

    let mut third = hub.subscribe().unwrap();
    assert_eq!(third.recv().await.unwrap().event(), "connected");
    assert!(third.try_recv().is_none());

    drop(first);
    gateway
        .update("deliverables", &id, json!({"status": "Completed"}))
        .await
        .unwrap();
    assert_eq!(second.recv().await.unwrap().event(), "updated");
    assert_eq!(third.recv().await.unwrap().event(), "updated");
    assert_eq!(hub.stats().await.live_subscribers, 2);
}

/// Create then get returns the supplied fields plus server fields.
#[tokio::test]
async fn test_create_get_round_trip() {
    let (gateway, _hub) = setup();
    let fields = json!({
        "title": "Launch post",
        "content_type": "Blog Post",
        "status": "Draft",
        "content_body": "Hello"
    });

    let id = gateway.create("content", fields.clone()).await.unwrap();
    let record = gateway.get("content", &id).await.unwrap().to_json();

    for (key, value) in fields.as_object().unwrap() {
        assert_eq!(&record[key], value);
    }
    assert_eq!(record["id"], id.as_str());
    assert!(record["created_at"].is_string());
    assert!(record["updated_at"].is_string());
}
