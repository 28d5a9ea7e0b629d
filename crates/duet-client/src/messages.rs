//! Message log sync.
//!
//! One shared log per conversation at `messages/{conversationId}`. Writers
//! only ever append; readers watch the whole document and receive the full
//! sequence on every change, newest first.

use futures::stream::{self, Stream};
use tracing::{debug, info, warn};

use duet_shared::constants::{MESSAGES_COLLECTION, MESSAGES_FIELD};
use duet_shared::models::to_doc;
use duet_shared::{ConversationId, ConversationLog, Message};
use duet_store::{DocumentStore, Subscription};

use crate::error::Result;

/// Live view of one conversation's messages.
///
/// Every item is the complete log in reverse storage order (most recently
/// appended first). The first item is the state at subscription time.
#[derive(Debug)]
pub struct MessageFeed {
    conversation_id: ConversationId,
    subscription: Subscription,
}

impl MessageFeed {
    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Wait for the next full snapshot. `None` after [`MessageFeed::unsubscribe`].
    pub async fn next(&mut self) -> Option<Vec<Message>> {
        let snapshot = self.subscription.next().await?;

        let decoded = ConversationLog::from_doc(snapshot.data.as_ref());
        if decoded.skipped > 0 {
            warn!(
                conversation = %self.conversation_id,
                skipped = decoded.skipped,
                "Unreadable messages left out of the log"
            );
        }
        Some(decoded.value.newest_first())
    }

    /// Stop delivery and release the push channel. Safe to call repeatedly.
    pub fn unsubscribe(&mut self) {
        if self.subscription.is_active() {
            debug!(conversation = %self.conversation_id, "Message feed closed");
        }
        self.subscription.unsubscribe();
    }

    pub fn into_stream(self) -> impl Stream<Item = Vec<Message>> {
        stream::unfold(self, |mut feed| async move {
            let item = feed.next().await?;
            Some((item, feed))
        })
    }
}

/// Watch a conversation's log. An absent log reads as empty until created.
pub async fn subscribe(
    store: &dyn DocumentStore,
    conversation_id: &ConversationId,
) -> Result<MessageFeed> {
    let subscription = store
        .subscribe(MESSAGES_COLLECTION, conversation_id.as_str())
        .await?;

    debug!(conversation = %conversation_id, "Message feed opened");

    Ok(MessageFeed {
        conversation_id: conversation_id.clone(),
        subscription,
    })
}

/// Append one message to the end of the shared log.
///
/// Does not touch either participant's index; see
/// [`crate::index::send_side_effect`].
pub async fn append(
    store: &dyn DocumentStore,
    conversation_id: &ConversationId,
    message: &Message,
) -> Result<()> {
    store
        .append_to_array(
            MESSAGES_COLLECTION,
            conversation_id.as_str(),
            MESSAGES_FIELD,
            to_doc(message)?,
        )
        .await?;

    debug!(
        conversation = %conversation_id,
        sender = %message.sender_id,
        "Message appended"
    );
    Ok(())
}

/// Write a fresh, empty log, replacing anything at that id.
pub async fn create_log(store: &dyn DocumentStore, conversation_id: &ConversationId) -> Result<()> {
    store
        .set(
            MESSAGES_COLLECTION,
            conversation_id.as_str(),
            to_doc(&ConversationLog::empty())?,
        )
        .await?;
    info!(conversation = %conversation_id, "Message log created");
    Ok(())
}

/// Create the log only if it does not exist yet. Returns whether it was created.
///
/// A log written concurrently by the other participant is never replaced.
pub async fn ensure_log(store: &dyn DocumentStore, conversation_id: &ConversationId) -> Result<bool> {
    let created = store
        .create_if_absent(
            MESSAGES_COLLECTION,
            conversation_id.as_str(),
            to_doc(&ConversationLog::empty())?,
        )
        .await?;

    if created {
        info!(conversation = %conversation_id, "Message log created");
    }
    Ok(created)
}

/// Whether the log document exists.
pub async fn log_exists(store: &dyn DocumentStore, conversation_id: &ConversationId) -> Result<bool> {
    Ok(store
        .get(MESSAGES_COLLECTION, conversation_id.as_str())
        .await?
        .is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_shared::UserId;
    use duet_store::MemoryStore;
    use futures::StreamExt;
    use serde_json::json;

    async fn write_bare_log(store: &dyn DocumentStore, conversation_id: &ConversationId) {
        store
            .set(
                MESSAGES_COLLECTION,
                conversation_id.as_str(),
                json!({ "createdAt": chrono::Utc::now() }),
            )
            .await
            .unwrap();
    }

    fn text(sender: &str, body: &str) -> Message {
        Message::text(UserId::from(sender), body).unwrap()
    }

    fn bodies(messages: &[Message]) -> Vec<&str> {
        messages.iter().filter_map(|m| m.body.as_deref()).collect()
    }

    #[tokio::test]
    async fn test_feed_delivers_reverse_of_append_order() {
        let store = MemoryStore::new();
        let id = ConversationId::new();
        create_log(&store, &id).await.unwrap();

        for body in ["one", "two", "three"] {
            append(&store, &id, &text("alice", body)).await.unwrap();
        }

        let mut feed = subscribe(&store, &id).await.unwrap();
        let messages = feed.next().await.unwrap();
        assert_eq!(bodies(&messages), ["three", "two", "one"]);

        // Re-subscribing yields the same sequence.
        let mut again = subscribe(&store, &id).await.unwrap();
        assert_eq!(again.next().await.unwrap(), messages);
    }

    #[tokio::test]
    async fn test_feed_follows_new_appends() {
        let store = MemoryStore::new();
        let id = ConversationId::new();
        create_log(&store, &id).await.unwrap();

        let mut feed = subscribe(&store, &id).await.unwrap();
        assert!(feed.next().await.unwrap().is_empty());

        append(&store, &id, &text("alice", "hi")).await.unwrap();
        assert_eq!(bodies(&feed.next().await.unwrap()), ["hi"]);

        append(&store, &id, &text("bob", "hey")).await.unwrap();
        assert_eq!(bodies(&feed.next().await.unwrap()), ["hey", "hi"]);
    }

    #[tokio::test]
    async fn test_absent_or_bare_log_reads_empty() {
        let store = MemoryStore::new();
        let id = ConversationId::new();

        let mut feed = subscribe(&store, &id).await.unwrap();
        assert!(feed.next().await.unwrap().is_empty());

        write_bare_log(&store, &id).await;
        assert!(feed.next().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_to_missing_log_fails() {
        let store = MemoryStore::new();
        let id = ConversationId::new();
        assert!(append(&store, &id, &text("alice", "hi")).await.is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery_and_releases_channel() {
        let store = MemoryStore::new();
        let id = ConversationId::new();
        create_log(&store, &id).await.unwrap();

        let mut feed = subscribe(&store, &id).await.unwrap();
        feed.next().await.unwrap();
        assert_eq!(store.watched_count(), 1);

        feed.unsubscribe();
        feed.unsubscribe();
        assert!(!feed.is_active());
        assert!(feed.next().await.is_none());
        assert_eq!(store.watched_count(), 0);
    }

    #[tokio::test]
    async fn test_ensure_log_is_idempotent() {
        let store = MemoryStore::new();
        let id = ConversationId::new();

        assert!(ensure_log(&store, &id).await.unwrap());
        append(&store, &id, &text("alice", "keep me")).await.unwrap();
        assert!(!ensure_log(&store, &id).await.unwrap());

        let mut feed = subscribe(&store, &id).await.unwrap();
        assert_eq!(bodies(&feed.next().await.unwrap()), ["keep me"]);
    }

    #[tokio::test]
    async fn test_partial_message_does_not_hide_the_rest() {
        let store = MemoryStore::new();
        let id = ConversationId::new();
        create_log(&store, &id).await.unwrap();
        append(&store, &id, &text("alice", "hello")).await.unwrap();
        store
            .append_to_array(
                MESSAGES_COLLECTION,
                id.as_str(),
                MESSAGES_FIELD,
                json!({"senderId": "bob", "body": "yo"}),
            )
            .await
            .unwrap();

        let mut feed = subscribe(&store, &id).await.unwrap();
        assert_eq!(bodies(&feed.next().await.unwrap()), ["hello"]);
    }

    #[tokio::test]
    async fn test_ensure_log_racing_creator_keeps_messages() {
        let store = MemoryStore::new();

        for _ in 0..20 {
            let id = ConversationId::new();
            let creator = async {
                create_log(&store, &id).await.unwrap();
                append(&store, &id, &text("alice", "first!")).await.unwrap();
            };
            let opener = async {
                ensure_log(&store, &id).await.unwrap();
            };
            tokio::join!(opener, creator);

            let mut feed = subscribe(&store, &id).await.unwrap();
            assert_eq!(bodies(&feed.next().await.unwrap()), ["first!"]);
        }
    }

    #[tokio::test]
    async fn test_feed_as_stream() {
        let store = MemoryStore::new();
        let id = ConversationId::new();
        create_log(&store, &id).await.unwrap();
        append(&store, &id, &text("alice", "hi")).await.unwrap();

        let feed = subscribe(&store, &id).await.unwrap();
        let mut stream = Box::pin(feed.into_stream());
        let first = stream.next().await.unwrap();
        assert_eq!(bodies(&first), ["hi"]);
    }
}
