//! Presence heartbeat and the derived online check.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use duet_shared::constants::{LAST_SEEN_FIELD, USERS_COLLECTION};
use duet_shared::{now_millis, UserId};
use duet_store::DocumentStore;

use crate::error::Result;

/// Shortest interval a heartbeat will tick at.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Whether a user last seen at `last_seen_at` counts as online at `now`.
pub fn is_online(last_seen_at: i64, now: i64, threshold_ms: i64) -> bool {
    now.saturating_sub(last_seen_at) <= threshold_ms
}

/// Write `lastSeenAt = now` on the user's own profile. A stored value ahead
/// of the local clock is kept.
pub async fn touch(store: &dyn DocumentStore, user_id: &UserId) -> Result<()> {
    let previous = store
        .get(USERS_COLLECTION, user_id.as_str())
        .await?
        .and_then(|doc| doc.get(LAST_SEEN_FIELD).and_then(Value::as_i64));
    let seen = previous.map_or(now_millis(), |prev| now_millis().max(prev));

    store
        .update_merge(
            USERS_COLLECTION,
            user_id.as_str(),
            json!({ LAST_SEEN_FIELD: seen }),
        )
        .await?;
    trace!(user = %user_id, seen, "Presence heartbeat written");
    Ok(())
}

/// Background task refreshing the session user's `lastSeenAt`.
///
/// Writes once immediately, then once per interval. Stops on
/// [`Heartbeat::stop`] or when dropped.
pub struct Heartbeat {
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Intervals below [`MIN_HEARTBEAT_INTERVAL`] are raised to it.
    pub fn start(store: Arc<dyn DocumentStore>, user_id: UserId, every: Duration) -> Self {
        let every = if every < MIN_HEARTBEAT_INTERVAL {
            warn!(
                requested_ms = every.as_millis() as u64,
                "Heartbeat interval too short, raising it"
            );
            MIN_HEARTBEAT_INTERVAL
        } else {
            every
        };

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = touch(store.as_ref(), &user_id).await {
                    warn!(user = %user_id, error = %e, "Presence heartbeat failed");
                }
            }
        });

        debug!(interval_secs = every.as_secs(), "Presence heartbeat started");
        Self {
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Presence heartbeat stopped");
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}
