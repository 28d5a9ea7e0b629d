//! Push fan-out for document subscriptions.
//!
//! Each watched document gets one `tokio::sync::watch` channel carrying its
//! latest full state. Receivers only ever see the newest value, so a slow
//! consumer skips intermediate snapshots instead of lagging. The channel is
//! dropped as soon as its last subscription goes away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::document::DocKey;

/// Full state of one document at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub key: DocKey,
    /// `None` while the document does not exist.
    pub data: Option<Value>,
}

impl DocumentSnapshot {
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }
}

/// Registry of per-document watch channels.
#[derive(Debug, Default)]
pub struct WatchHub {
    channels: Mutex<HashMap<DocKey, watch::Sender<Option<Value>>>>,
}

impl WatchHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach a subscriber to `key`.
    ///
    /// `current` seeds the channel when nobody watches the document yet;
    /// callers must hold their own write lock across this call so the seed
    /// cannot race a concurrent publish.
    pub fn subscribe(self: &Arc<Self>, key: DocKey, current: Option<Value>) -> Subscription {
        let mut channels = self.lock();
        let receiver = match channels.get(&key) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = watch::channel(current);
                channels.insert(key.clone(), sender);
                receiver
            }
        };
        debug!(doc = %key, "subscription attached");

        Subscription {
            key,
            receiver: Some(receiver),
            hub: Arc::clone(self),
            primed: false,
        }
    }

    /// Push a new document state to every subscriber of `key`, if any.
    pub fn publish(&self, key: &DocKey, data: Option<Value>) {
        let channels = self.lock();
        if let Some(sender) = channels.get(key) {
            sender.send_replace(data);
        }
    }

    /// Number of documents currently watched.
    pub fn watched_count(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, key: &DocKey) {
        let mut channels = self.lock();
        let idle = channels
            .get(key)
            .map(|sender| sender.receiver_count() == 0)
            .unwrap_or(false);
        if idle {
            channels.remove(key);
            debug!(doc = %key, "push channel released");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DocKey, watch::Sender<Option<Value>>>> {
        // A panic while holding this lock leaves the map itself consistent.
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A live subscription to one document.
///
/// Yields the current state first, then each new state. Dropping the handle
/// or calling [`Subscription::unsubscribe`] stops delivery and releases the
/// push channel.
#[derive(Debug)]
pub struct Subscription {
    key: DocKey,
    receiver: Option<watch::Receiver<Option<Value>>>,
    hub: Arc<WatchHub>,
    primed: bool,
}

impl Subscription {
    pub fn key(&self) -> &DocKey {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Wait for the next snapshot. `None` once unsubscribed or the store is gone.
    pub async fn next(&mut self) -> Option<DocumentSnapshot> {
        let receiver = self.receiver.as_mut()?;

        if self.primed {
            receiver.changed().await.ok()?;
        } else {
            self.primed = true;
        }

        let data = receiver.borrow_and_update().clone();
        Some(DocumentSnapshot {
            key: self.key.clone(),
            data,
        })
    }

    /// Stop delivery. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            drop(receiver);
            self.hub.release(&self.key);
            debug!(doc = %self.key, "subscription detached");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
