//! Conversation index.
//!
//! Each user owns one index document at `chats/{userId}` whose `chatsData`
//! array holds a [`ConversationSummary`] per conversation. Both participants
//! keep their own mirror of every conversation, and every send rewrites both
//! mirrors. The rewrite replaces the whole array, so two senders racing on the
//! same index can lose one update; nothing here detects that.

use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{self, Stream};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use duet_shared::constants::{CHATS_COLLECTION, CHATS_FIELD, USERS_COLLECTION};
use duet_shared::models::to_doc;
use duet_shared::{
    now_millis, ChatIndex, ConversationEntry, ConversationId, ConversationSummary, MessageContent,
    User, UserId,
};
use duet_store::{DocumentStore, StoreError, Subscription};

use crate::error::{ClientError, Result};
use crate::session::SessionContext;

/// Conversation-list preview for a message.
pub fn preview(content: MessageContent<'_>) -> String {
    content.preview()
}

/// Read a user's index. An absent document reads as empty and unreadable
/// entries are left out.
pub async fn load_index(store: &dyn DocumentStore, owner: &UserId) -> Result<ChatIndex> {
    let doc = store.get(CHATS_COLLECTION, owner.as_str()).await?;
    Ok(decode_index(owner, doc.as_ref()))
}

fn decode_index(owner: &UserId, doc: Option<&Value>) -> ChatIndex {
    let decoded = ChatIndex::from_doc(doc);
    if decoded.skipped > 0 {
        warn!(owner = %owner, skipped = decoded.skipped, "Unreadable index entries left out");
    }
    decoded.value
}

/// Write an empty index for a new user.
pub async fn create_index(store: &dyn DocumentStore, owner: &UserId) -> Result<()> {
    store
        .set(CHATS_COLLECTION, owner.as_str(), to_doc(&ChatIndex::default())?)
        .await?;
    Ok(())
}

/// Append one summary to `owner`'s index.
pub async fn add_entry(
    store: &dyn DocumentStore,
    owner: &UserId,
    summary: &ConversationSummary,
) -> std::result::Result<(), StoreError> {
    let element = serde_json::to_value(summary)?;
    store
        .append_to_array(CHATS_COLLECTION, owner.as_str(), CHATS_FIELD, element)
        .await
}

/// Update both participants' summaries after a message landed in the log.
///
/// Sets the preview and timestamp on both mirrors and marks the recipient's
/// mirror unread. The two owners are rewritten concurrently and
/// independently: if exactly one write fails the call returns
/// [`ClientError::PartialWrite`] and the mirrors disagree until the next send
/// or a repair pass.
pub async fn send_side_effect(
    store: &dyn DocumentStore,
    conversation_id: &ConversationId,
    sender: &UserId,
    recipient: &UserId,
    preview: &str,
) -> Result<()> {
    let now = now_millis();

    let (recipient_result, sender_result) = tokio::join!(
        update_owner_entry(store, recipient, conversation_id, sender, preview, now),
        update_owner_entry(store, sender, conversation_id, sender, preview, now),
    );

    match (recipient_result, sender_result) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) => Err(partial_write(conversation_id, recipient, e)),
        (Ok(()), Err(e)) => Err(partial_write(conversation_id, sender, e)),
        (Err(e), Err(other)) => {
            warn!(
                conversation = %conversation_id,
                error = %e,
                other_error = %other,
                "Both index updates failed"
            );
            Err(e.into())
        }
    }
}

fn partial_write(conversation_id: &ConversationId, owner: &UserId, source: StoreError) -> ClientError {
    error!(
        conversation = %conversation_id,
        owner = %owner,
        error = %source,
        "Index mirrors diverged: one participant's summary was not updated"
    );
    ClientError::PartialWrite {
        conversation_id: conversation_id.clone(),
        failed_owner: owner.clone(),
        source,
    }
}

/// Read-modify-write of one owner's whole index array.
///
/// Only the matching entry changes. Every other element, including ones this
/// client cannot decode, is written back as it was read.
async fn update_owner_entry(
    store: &dyn DocumentStore,
    owner: &UserId,
    conversation_id: &ConversationId,
    sender: &UserId,
    preview: &str,
    now: i64,
) -> std::result::Result<(), StoreError> {
    let Some(doc) = store.get(CHATS_COLLECTION, owner.as_str()).await? else {
        warn!(owner = %owner, "No index document, skipping summary update");
        return Ok(());
    };

    let Some(Value::Array(mut elements)) = doc.get(CHATS_FIELD).cloned() else {
        warn!(owner = %owner, "Index has no entry list, skipping summary update");
        return Ok(());
    };

    let target = elements.iter_mut().find_map(|element| {
        let summary: ConversationSummary = serde_json::from_value(element.clone()).ok()?;
        (&summary.conversation_id == conversation_id).then_some((element, summary))
    });
    let Some((element, mut entry)) = target else {
        warn!(
            owner = %owner,
            conversation = %conversation_id,
            "Conversation missing from index, skipping summary update"
        );
        return Ok(());
    };

    entry.last_message = preview.to_string();
    entry.updated_at = now.max(entry.updated_at);
    if &entry.counterpart_id == sender {
        entry.unread = true;
    }

    // Merge into the raw element so fields this client does not know survive.
    if let (Value::Object(raw), Value::Object(fields)) = (element, serde_json::to_value(&entry)?) {
        raw.extend(fields);
    }

    store
        .update_merge(
            CHATS_COLLECTION,
            owner.as_str(),
            json!({ CHATS_FIELD: elements }),
        )
        .await?;

    debug!(owner = %owner, conversation = %conversation_id, "Summary updated");
    Ok(())
}

// ---------------------------------------------------------------------------
// Live view
// ---------------------------------------------------------------------------

/// Live, recency-sorted conversation list for one user.
///
/// Every push of the owner's index re-resolves each counterpart's profile, so
/// names, avatars, and presence stay current without a separate subscription.
pub struct ConversationFeed {
    owner: UserId,
    store: Arc<dyn DocumentStore>,
    subscription: Subscription,
}

impl ConversationFeed {
    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Wait for the next index push and resolve it into entries, newest first.
    pub async fn next(&mut self) -> Option<Vec<ConversationEntry>> {
        let snapshot = self.subscription.next().await?;

        let index = decode_index(&self.owner, snapshot.data.as_ref());
        Some(resolve_entries(self.store.as_ref(), index).await)
    }

    /// Stop delivery and release the push channel. Safe to call repeatedly.
    pub fn unsubscribe(&mut self) {
        self.subscription.unsubscribe();
    }

    pub fn into_stream(self) -> impl Stream<Item = Vec<ConversationEntry>> {
        stream::unfold(self, |mut feed| async move {
            let item = feed.next().await?;
            Some((item, feed))
        })
    }
}

/// Subscribe to the session user's index.
pub async fn live_view(
    store: Arc<dyn DocumentStore>,
    session: &SessionContext,
) -> Result<ConversationFeed> {
    let owner = session.user_id().clone();
    let subscription = store.subscribe(CHATS_COLLECTION, owner.as_str()).await?;

    debug!(owner = %owner, "Conversation feed opened");

    Ok(ConversationFeed {
        owner,
        store,
        subscription,
    })
}

/// Join every summary with its counterpart's current profile, looked up in
/// parallel, and sort by `updated_at` descending.
pub async fn resolve_entries(store: &dyn DocumentStore, index: ChatIndex) -> Vec<ConversationEntry> {
    let lookups = index.chats_data.into_iter().map(|summary| async move {
        let counterpart = lookup_user(store, &summary.counterpart_id).await;
        ConversationEntry {
            summary,
            counterpart,
        }
    });

    let mut entries = join_all(lookups).await;
    entries.sort_by(|a, b| b.summary.updated_at.cmp(&a.summary.updated_at));
    entries
}

async fn lookup_user(store: &dyn DocumentStore, user_id: &UserId) -> Option<User> {
    match store.get(USERS_COLLECTION, user_id.as_str()).await {
        Ok(Some(doc)) => match serde_json::from_value(doc) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(user = %user_id, error = %e, "Unreadable profile");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(user = %user_id, error = %e, "Profile lookup failed");
            None
        }
    }
}
