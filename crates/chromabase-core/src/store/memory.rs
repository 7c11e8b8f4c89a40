//! In-process document store.
//!
//! Used for development and tests. Records keep insertion order when listed.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{ChromaError, ChromaResult};
use crate::record::{Document, Record, RecordId};
use crate::store::DocumentStore;

#[derive(Default)]
struct Collection {
    next_seq: u64,
    records: HashMap<String, (u64, Document)>,
}

/// Document store kept entirely in memory.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.records.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self, collection: &str) -> ChromaResult<Vec<Record>> {
        let collections = self.collections.read().await;
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<_> = coll.records.iter().collect();
        entries.sort_by_key(|(_, (seq, _))| *seq);
        Ok(entries
            .into_iter()
            .map(|(id, (_, fields))| Record::new(id.clone(), fields.clone()))
            .collect())
    }

    async fn get(&self, collection: &str, id: &str) -> ChromaResult<Option<Record>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.records.get(id))
            .map(|(_, fields)| Record::new(id, fields.clone())))
    }

    async fn create(&self, collection: &str, fields: Document) -> ChromaResult<RecordId> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let mut collections = self.collections.write().await;
        let coll = collections.entry(collection.to_string()).or_default();
        let seq = coll.next_seq;
        coll.next_seq += 1;
        coll.records.insert(id.clone(), (seq, fields));
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Document) -> ChromaResult<()> {
        let mut collections = self.collections.write().await;
        let (_, existing) = collections
            .get_mut(collection)
            .and_then(|c| c.records.get_mut(id))
            .ok_or_else(|| ChromaError::not_found(collection, id))?;

        for (key, value) in fields {
            existing.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> ChromaResult<()> {
        let mut collections = self.collections.write().await;
        collections
            .get_mut(collection)
            .and_then(|c| c.records.remove(id))
            .map(|_| ())
            .ok_or_else(|| ChromaError::not_found(collection, id))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
