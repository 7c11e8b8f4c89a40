//! chromabase-core - Core library for the ChromaBase change notification service.
//!
//! This crate provides the collection rules, the document store abstraction,
//! the mutation gateway, and the fan-out of change events to webhooks and
//! live stream subscribers.
//!
//! # Example
//!
//! ```ignore
//! use chromabase_core::{create_store, MutationGateway, NotificationHub, ServiceConfig};
//! use std::sync::Arc;
//!
//! let config = ServiceConfig::load()?;
//! let hub = Arc::new(NotificationHub::new(&config)?);
//!
//! let gateway = MutationGateway::new(create_store(&config.store)?, config.catalog()?, hub);
//! let id = gateway
//!     .create("clients", json!({"name": "Acme", "email": "ops@acme.io", "status": "active"}))
//!     .await?;
//! ```

pub mod collections;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod models;
pub mod record;
pub mod store;

// Re-export commonly used types
pub use collections::{CollectionCatalog, CollectionRules};
pub use config::{FirestoreConfig, ServiceConfig, StoreConfig, StreamSettings, WebhookSettings};
pub use error::{ChromaError, ChromaResult, ErrorCode};
pub use events::{
    verify_signature, ChangeEvent, ChangeKind, HubStats, LiveBroadcaster, LiveFrame,
    NotificationHub, SubscriberHandle, SubscriberState, WebhookDispatcher, WebhookPayload,
    WebhookRegistry,
};
pub use gateway::{Mutation, MutationGateway};
pub use models::{
    Campaign, CampaignStatus, Client, CollectionRecord, Content, Deliverable, Lead, Stored,
};
pub use record::{Document, Record, RecordId};
pub use store::{create_store, DocumentStore, FirestoreStore, MemoryDocumentStore};
