//! Shared helpers for the duet-client integration tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use duet_client::{ChatSession, ClientError, MediaUploader, SessionContext};
use duet_store::{DocumentStore, MemoryStore, StoreError, Subscription};

/// Default timeout for a feed to deliver.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize test logging. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("duet_client=debug,duet_store=info")),
        )
        .with_test_writer()
        .try_init();
}

/// Run an async operation with a timeout.
#[allow(dead_code)]
pub async fn with_timeout<T, F>(fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, fut)
        .await
        .expect("Test operation timed out")
}

/// Memory store whose reads or writes to selected documents fail, and whose
/// reads can be slowed down.
#[derive(Clone, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    broken: Arc<Mutex<HashSet<(String, String)>>>,
    unreadable: Arc<Mutex<HashSet<(String, String)>>>,
    read_delay: Arc<Mutex<Option<Duration>>>,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `collection/id` fail until [`FaultyStore::heal`].
    pub fn break_writes(&self, collection: &str, id: &str) {
        self.broken
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.to_string()));
    }

    /// Make every read of `collection/id` fail until [`FaultyStore::heal`].
    pub fn break_reads(&self, collection: &str, id: &str) {
        self.unreadable
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.to_string()));
    }

    /// Hold every `get` for `delay` before reading.
    pub fn delay_reads(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn heal(&self) {
        self.broken.lock().unwrap().clear();
        self.unreadable.lock().unwrap().clear();
        *self.read_delay.lock().unwrap() = None;
    }

    fn check(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        injected(&self.broken, collection, id)
    }

    async fn check_read(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        injected(&self.unreadable, collection, id)
    }
}

fn injected(
    keys: &Mutex<HashSet<(String, String)>>,
    collection: &str,
    id: &str,
) -> Result<(), StoreError> {
    if keys
        .lock()
        .unwrap()
        .contains(&(collection.to_string(), id.to_string()))
    {
        return Err(StoreError::Unavailable(format!(
            "injected failure on {collection}/{id}"
        )));
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.check_read(collection, id).await?;
        self.inner.get(collection, id).await
    }

    async fn create_if_absent(
        &self,
        collection: &str,
        id: &str,
        doc: Value,
    ) -> Result<bool, StoreError> {
        self.check(collection, id)?;
        self.inner.create_if_absent(collection, id, doc).await
    }

    async fn set(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        self.check(collection, id)?;
        self.inner.set(collection, id, doc).await
    }

    async fn update_merge(&self, collection: &str, id: &str, fields: Value) -> Result<(), StoreError> {
        self.check(collection, id)?;
        self.inner.update_merge(collection, id, fields).await
    }

    async fn append_to_array(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        element: Value,
    ) -> Result<(), StoreError> {
        self.check(collection, id)?;
        self.inner.append_to_array(collection, id, field, element).await
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, StoreError> {
        self.inner.find_by_field(collection, field, value).await
    }

    async fn subscribe(&self, collection: &str, id: &str) -> Result<Subscription, StoreError> {
        self.inner.subscribe(collection, id).await
    }
}

/// Uploader that always fails.
pub struct FailingUploader;

#[async_trait]
impl MediaUploader for FailingUploader {
    async fn upload(&self, _file_name: &str, _bytes: Vec<u8>) -> duet_client::Result<String> {
        Err(ClientError::Upload("host unreachable".into()))
    }
}

/// Uploader that serves everything from a fixed CDN prefix.
pub struct CdnUploader;

#[async_trait]
impl MediaUploader for CdnUploader {
    async fn upload(&self, file_name: &str, _bytes: Vec<u8>) -> duet_client::Result<String> {
        Ok(format!("https://cdn.example/{file_name}"))
    }
}

/// Register `handle` under id `u-{handle}` and return a session for it.
#[allow(dead_code)]
pub async fn signed_up(
    store: Arc<dyn DocumentStore>,
    handle: &str,
    uploader: Arc<dyn MediaUploader>,
) -> ChatSession {
    let id = format!("u-{handle}");
    duet_client::profile::register(store.as_ref(), &id.as_str().into(), handle)
        .await
        .unwrap();
    ChatSession::new(store, SessionContext::new(id), uploader)
}
