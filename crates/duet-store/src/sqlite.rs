//! SQLite-backed document store.
//!
//! Documents persist as JSON rows; pushes are delivered in-process through the
//! same [`WatchHub`] the memory store uses. Every read-modify-write runs inside
//! one SQLite transaction while the connection lock is held, which is what
//! makes [`DocumentStore::append_to_array`] atomic.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::database::Database;
use crate::document::{append_element, ensure_object, merge_fields, DocKey, DocumentStore};
use crate::error::{Result, StoreError};
use crate::hub::{Subscription, WatchHub};

#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
    hub: Arc<WatchHub>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            hub: WatchHub::new(),
        }
    }

    /// Open the default application database.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Database::new()?))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))
    }

    fn modify<F>(&self, collection: &str, id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut Value, &DocKey) -> Result<()>,
    {
        let key = DocKey::new(collection, id);
        let db = self.lock()?;
        let tx = db.conn().unchecked_transaction()?;

        let mut doc = db
            .get_document(collection, id)?
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        mutate(&mut doc, &key)?;
        db.put_document(collection, id, &doc)?;
        tx.commit()?;

        self.hub.publish(&key, Some(doc));
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.lock()?.get_document(collection, id)
    }

    async fn set(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
        let key = DocKey::new(collection, id);
        ensure_object(&doc, &key)?;

        let db = self.lock()?;
        db.put_document(collection, id, &doc)?;
        self.hub.publish(&key, Some(doc));
        trace!(doc = %key, "document set");
        Ok(())
    }

    async fn create_if_absent(&self, collection: &str, id: &str, doc: Value) -> Result<bool> {
        let key = DocKey::new(collection, id);
        ensure_object(&doc, &key)?;

        let db = self.lock()?;
        let created = db.insert_document_if_absent(collection, id, &doc)?;
        if created {
            self.hub.publish(&key, Some(doc));
            trace!(doc = %key, "document created");
        }
        Ok(created)
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
        self.lock()?.find_documents(collection, field, value)
    }

    async fn subscribe(&self, collection: &str, id: &str) -> Result<Subscription> {
        let key = DocKey::new(collection, id);
        let db = self.lock()?;
        let current = db.get_document(collection, id)?;
        Ok(self.hub.subscribe(key, current))
    }
}
