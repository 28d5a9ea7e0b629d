//! In-process document store.
//!
//! Clones share the same documents, so several client sessions in one process
//! (tests, the demo binary) see each other's writes and pushes exactly as two
//! remote clients would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::document::{append_element, ensure_object, merge_fields, DocKey, DocumentStore};
use crate::error::{Result, StoreError};
use crate::hub::{Subscription, WatchHub};

#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<Mutex<HashMap<DocKey, Value>>>,
    hub: Arc<WatchHub>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently watched by at least one subscription.
    pub fn watched_count(&self) -> usize {
        self.hub.watched_count()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<DocKey, Value>>> {
        self.docs
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))
    }

    /// Apply `mutate` to an existing document and push the result.
    fn modify<F>(&self, collection: &str, id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Value, &DocKey) -> Result<()>,
    {
        let key = DocKey::new(collection, id);
        let mut docs = self.lock()?;
        let doc = docs
            .get_mut(&key)
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        // Mutate a copy so a failed update leaves the stored document untouched.
        let mut updated = doc.clone();
        mutate(&mut updated, &key)?;
        *doc = updated.clone();

        self.hub.publish(&key, Some(updated));
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let docs = self.lock()?;
        Ok(docs.get(&DocKey::new(collection, id)).cloned())
    }

    async fn set(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        let key = DocKey::new(collection, id);
        ensure_object(&doc, &key)?;

        let mut docs = self.lock()?;
        docs.insert(key.clone(), doc.clone());
        self.hub.publish(&key, Some(doc));
        trace!(doc = %key, "document set");
        Ok(())
    }

    async fn create_if_absent(&self, collection: &str, id: &str, doc: Value) -> Result<bool> {
        let key = DocKey::new(collection, id);
        ensure_object(&doc, &key)?;

        let mut docs = self.lock()?;
        if docs.contains_key(&key) {
            return Ok(false);
        }
        docs.insert(key.clone(), doc.clone());
        self.hub.publish(&key, Some(doc));
        trace!(doc = %key, "document created");
        Ok(true)
    }

    async fn update_merge(&self, collection: &str, id: &str, fields: Value) -> Result<()> {
        self.modify(collection, id, |doc, key| merge_fields(doc, key, fields))
    }

    async fn append_to_array(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        element: Value,
    ) -> Result<()> {
        self.modify(collection, id, |doc, key| {
            append_element(doc, key, field, element)
        })
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>> {
        let docs = self.lock()?;
        Ok(docs
            .iter()
            .filter(|(key, doc)| key.collection == collection && doc.get(field) == Some(value))
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn subscribe(&self, collection: &str, id: &str) -> Result<Subscription> {
        let key = DocKey::new(collection, id);
        let docs = self.lock()?;
        let current = docs.get(&key).cloned();
        Ok(self.hub.subscribe(key, current))
    }
}
