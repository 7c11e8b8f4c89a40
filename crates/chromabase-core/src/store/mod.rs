//! Document store abstraction.
//!
//! The store is an external collaborator: collections of schemaless records
//! keyed by identifier. Backends implement [`DocumentStore`]; the gateway only
//! ever talks to the trait.

mod firestore;
mod memory;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::ChromaResult;
use crate::record::{Document, Record, RecordId};

pub use firestore::FirestoreStore;
pub use memory::MemoryDocumentStore;

/// Core DocumentStore trait - all persistence backends implement this.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// List every record in a collection.
    async fn list(&self, collection: &str) -> ChromaResult<Vec<Record>>;

    /// Fetch one record. Returns `Ok(None)` when it does not exist.
    async fn get(&self, collection: &str, id: &str) -> ChromaResult<Option<Record>>;

    /// Insert a new record and return the identifier the store assigned.
    async fn create(&self, collection: &str, fields: Document) -> ChromaResult<RecordId>;

    /// Merge `fields` into an existing record.
    ///
    /// Fails with `NotFound` when the record does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Document) -> ChromaResult<()>;

    /// Remove a record. Fails with `NotFound` when it does not exist.
    async fn delete(&self, collection: &str, id: &str) -> ChromaResult<()>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Create a document store from configuration.
pub fn create_store(config: &StoreConfig) -> ChromaResult<Arc<dyn DocumentStore>> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryDocumentStore::new())),
        StoreConfig::Firestore(firestore) => Ok(Arc::new(FirestoreStore::new(firestore.clone())?)),
    }
}
