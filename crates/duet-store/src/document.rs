//! The document store contract.
//!
//! A store holds JSON documents addressed by `(collection, id)`. Besides plain
//! reads and writes it offers two primitives the sync engine builds on: an
//! atomic array-append and a per-document subscription that pushes the full
//! document every time it changes.

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};
use crate::hub::Subscription;

/// Address of one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocKey {
    pub collection: String,
    pub id: String,
}

impl DocKey {
    pub fn new(collection: &str, id: &str) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Capability set the sync engine needs from a remote document database.
///
/// Every operation may suspend and may fail with a [`StoreError`]. Writes to a
/// document wake all of its subscribers with the new full state.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` if absent.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Create or replace a document.
    async fn set(&self, collection: &str, id: &str, doc: Value) -> Result<()>;

    /// Write `doc` only if nothing exists at that address yet. Returns whether
    /// it was written. Check and write are one atomic step.
    async fn create_if_absent(&self, collection: &str, id: &str, doc: Value) -> Result<bool>;

    /// Overwrite the given top-level fields of an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    async fn update_merge(&self, collection: &str, id: &str, fields: Value) -> Result<()>;

    /// Atomically push `element` onto the end of the array at `field` of an
    /// existing document. A missing field starts as an empty array.
    async fn append_to_array(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        element: Value,
    ) -> Result<()>;

    /// All documents in `collection` whose top-level `field` equals `value`.
    async fn find_by_field(&self, collection: &str, field: &str, value: &Value)
        -> Result<Vec<Value>>;

    /// Watch one document. The subscription first yields the current state,
    /// then every later state.
    async fn subscribe(&self, collection: &str, id: &str) -> Result<Subscription>;
}

// ---------------------------------------------------------------------------
// Document mutation helpers shared by the backends
// ---------------------------------------------------------------------------

fn as_object_mut<'a>(doc: &'a mut Value, key: &DocKey) -> Result<&'a mut Map<String, Value>> {
    doc.as_object_mut()
        .ok_or_else(|| StoreError::NotAnObject(key.to_string()))
}

/// Shallow-merge the top-level fields of `fields` into `doc`.
pub(crate) fn merge_fields(doc: &mut Value, key: &DocKey, fields: Value) -> Result<()> {
    let Value::Object(fields) = fields else {
        return Err(StoreError::NotAnObject(format!("merge into {key}")));
    };
    let target = as_object_mut(doc, key)?;
    for (name, value) in fields {
        target.insert(name, value);
    }
    Ok(())
}

/// Push `element` onto the array at `field`, creating the array if missing.
pub(crate) fn append_element(
    doc: &mut Value,
    key: &DocKey,
    field: &str,
    element: Value,
) -> Result<()> {
    let target = as_object_mut(doc, key)?;
    match target
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(items) => {
            items.push(element);
            Ok(())
        }
        _ => Err(StoreError::NotAnArray(field.to_string())),
    }
}

pub(crate) fn ensure_object(doc: &Value, key: &DocKey) -> Result<()> {
    if doc.is_object() {
        Ok(())
    } else {
        Err(StoreError::NotAnObject(key.to_string()))
    }
}
