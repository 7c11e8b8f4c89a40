//! Server state management.

use std::sync::Arc;

use chromabase_core::{
    create_store, ChromaResult, DocumentStore, MemoryDocumentStore, MutationGateway,
    NotificationHub, ServiceConfig,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<MutationGateway>,
    pub hub: Arc<NotificationHub>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    /// Build state over an explicit document store.
    pub fn new(config: ServiceConfig, store: Arc<dyn DocumentStore>) -> ChromaResult<Self> {
        let hub = Arc::new(NotificationHub::new(&config)?);
        let gateway = Arc::new(MutationGateway::new(store, config.catalog()?, hub.clone()));

        Ok(Self {
            gateway,
            hub,
            config: Arc::new(config),
        })
    }

    /// Build state with the store selected in the configuration.
    pub fn from_config(config: ServiceConfig) -> ChromaResult<Self> {
        let store = create_store(&config.store)?;
        Self::new(config, store)
    }

    /// State backed by an in-memory store.
    pub fn in_memory(config: ServiceConfig) -> ChromaResult<Self> {
        Self::new(config, Arc::new(MemoryDocumentStore::new()))
    }

    /// Close live streams and drain pending webhook deliveries.
    pub async fn shutdown(&self) {
        self.hub.shutdown().await;
    }
}
