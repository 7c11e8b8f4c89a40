//! chromabase-client - Typed client for the chromabase HTTP API.
//!
//! # Example
//!
//! ```ignore
//! use chromabase_client::ChromaClient;
//! use chromabase_core::Lead;
//!
//! let client = ChromaClient::new("http://localhost:3000")?;
//!
//! let id = client.create(&lead).await?;
//! let stored = client.get::<Lead>(&id).await?;
//!
//! client.register_webhook("leads", "https://hooks.example.com/leads").await?;
//! ```

mod client;

pub use client::{ChromaClient, HealthStatus, WebhookChange, WebhookRegistration};
pub use chromabase_core::models::{CollectionRecord, Stored};
