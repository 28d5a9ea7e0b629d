//! Conversation directory: finding people and starting conversations.

use serde_json::Value;
use tracing::{debug, error, info};

use duet_shared::constants::{HANDLE_FIELD, USERS_COLLECTION};
use duet_shared::{now_millis, ConversationId, ConversationSummary, User};
use duet_store::DocumentStore;

use crate::error::{ClientError, Result};
use crate::index::{add_entry, load_index};
use crate::messages::{self, MessageFeed};
use crate::session::SessionContext;

/// Look up another user by exact handle.
///
/// Returns `None` for an empty handle, for the caller's own handle, and for
/// anyone the caller already has a conversation with.
pub async fn resolve_by_handle(
    store: &dyn DocumentStore,
    session: &SessionContext,
    handle: &str,
) -> Result<Option<User>> {
    let handle = handle.trim().to_lowercase();
    if handle.is_empty() {
        return Ok(None);
    }

    let matches = store
        .find_by_field(USERS_COLLECTION, HANDLE_FIELD, &Value::String(handle.clone()))
        .await?;

    let Some(doc) = matches.into_iter().next() else {
        debug!(handle = %handle, "No user with that handle");
        return Ok(None);
    };
    let user: User = serde_json::from_value(doc).map_err(duet_shared::ModelError::from)?;

    if session.is_self(&user.id) {
        return Ok(None);
    }

    let index = load_index(store, session.user_id()).await?;
    if index.has_counterpart(&user.id) {
        debug!(handle = %handle, "Already in a conversation with that user");
        return Ok(None);
    }

    Ok(Some(user))
}

/// Start a conversation with `other`.
///
/// Writes the empty log first, then one summary into each participant's
/// index. The two index appends are independent; if the second fails after
/// the first landed the result is [`ClientError::PartialWrite`] and the
/// conversation is visible to only one side.
pub async fn create_conversation(
    store: &dyn DocumentStore,
    session: &SessionContext,
    other: &User,
) -> Result<ConversationSummary> {
    let me = session.user_id();
    if session.is_self(&other.id) {
        return Err(ClientError::InvalidRequest(
            "You cannot start a conversation with yourself".into(),
        ));
    }

    let conversation_id = ConversationId::new();
    messages::create_log(store, &conversation_id).await?;

    let now = now_millis();
    let mine = ConversationSummary::new(conversation_id.clone(), other.id.clone(), now);
    let theirs = ConversationSummary::new(conversation_id.clone(), me.clone(), now);

    add_entry(store, me, &mine).await?;

    if let Err(source) = add_entry(store, &other.id, &theirs).await {
        error!(
            conversation = %conversation_id,
            owner = %other.id,
            error = %source,
            "Conversation created on one side only"
        );
        return Err(ClientError::PartialWrite {
            conversation_id,
            failed_owner: other.id.clone(),
            source,
        });
    }

    info!(
        conversation = %conversation_id,
        with = %other.id.short(),
        "Conversation created"
    );
    Ok(mine)
}

/// Open a conversation's message feed, creating the log if it is missing.
pub async fn open_conversation(
    store: &dyn DocumentStore,
    summary: &ConversationSummary,
) -> Result<MessageFeed> {
    if messages::ensure_log(store, &summary.conversation_id).await? {
        info!(conversation = %summary.conversation_id, "Missing message log recreated");
    }
    messages::subscribe(store, &summary.conversation_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::create_index;
    use duet_shared::models::to_doc;
    use duet_shared::UserId;
    use duet_store::MemoryStore;

    async fn signup(store: &MemoryStore, id: &str, handle: &str) -> User {
        let user = User::new(UserId::from(id), handle);
        store
            .set(USERS_COLLECTION, id, to_doc(&user).unwrap())
            .await
            .unwrap();
        create_index(store, &user.id).await.unwrap();
        user
    }

    #[tokio::test]
    async fn test_resolve_normalizes_handle() {
        let store = MemoryStore::new();
        signup(&store, "u-alice", "alice").await;
        signup(&store, "u-bob", "bob").await;
        let session = SessionContext::new("u-alice");

        let found = resolve_by_handle(&store, &session, "  BoB ").await.unwrap();
        assert_eq!(found.unwrap().id, UserId::from("u-bob"));
        assert!(resolve_by_handle(&store, &session, "   ").await.unwrap().is_none());
        assert!(resolve_by_handle(&store, &session, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_excludes_self_and_existing_counterparts() {
        let store = MemoryStore::new();
        signup(&store, "u-alice", "alice").await;
        let bob = signup(&store, "u-bob", "bob").await;
        let session = SessionContext::new("u-alice");

        assert!(resolve_by_handle(&store, &session, "alice").await.unwrap().is_none());

        create_conversation(&store, &session, &bob).await.unwrap();
        for _ in 0..2 {
            assert!(resolve_by_handle(&store, &session, "bob").await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_create_writes_log_and_both_mirrors() {
        let store = MemoryStore::new();
        signup(&store, "u-alice", "alice").await;
        let bob = signup(&store, "u-bob", "bob").await;
        let session = SessionContext::new("u-alice");

        let summary = create_conversation(&store, &session, &bob).await.unwrap();
        assert_eq!(summary.counterpart_id, bob.id);
        assert!(!summary.unread);
        assert!(messages::log_exists(&store, &summary.conversation_id)
            .await
            .unwrap());

        let alice = load_index(&store, session.user_id()).await.unwrap();
        let bobs = load_index(&store, &bob.id).await.unwrap();
        assert_eq!(alice.chats_data.len(), 1);
        assert_eq!(bobs.chats_data.len(), 1);
        let mirror = bobs.find(&summary.conversation_id).unwrap();
        assert_eq!(mirror.counterpart_id, UserId::from("u-alice"));
        assert_eq!(mirror.updated_at, summary.updated_at);
    }

    #[tokio::test]
    async fn test_create_with_self_is_rejected() {
        let store = MemoryStore::new();
        let alice = signup(&store, "u-alice", "alice").await;
        let session = SessionContext::new("u-alice");

        let err = create_conversation(&store, &session, &alice).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_create_without_counterpart_index_is_partial() {
        let store = MemoryStore::new();
        signup(&store, "u-alice", "alice").await;
        let ghost = User::new(UserId::from("u-ghost"), "ghost");
        let session = SessionContext::new("u-alice");

        let err = create_conversation(&store, &session, &ghost).await.unwrap_err();
        match err {
            ClientError::PartialWrite { failed_owner, .. } => {
                assert_eq!(failed_owner, ghost.id)
            }
            other => panic!("unexpected error: {other}"),
        }
        let alice = load_index(&store, session.user_id()).await.unwrap();
        assert_eq!(alice.chats_data.len(), 1);
    }

    #[tokio::test]
    async fn test_open_recreates_missing_log() {
        let store = MemoryStore::new();
        let summary = ConversationSummary::new(ConversationId::new(), "u-bob".into(), 1);

        let mut feed = open_conversation(&store, &summary).await.unwrap();
        assert!(feed.next().await.unwrap().is_empty());
        assert!(messages::log_exists(&store, &summary.conversation_id)
            .await
            .unwrap());

        // Opening again is harmless.
        let mut again = open_conversation(&store, &summary).await.unwrap();
        assert!(again.next().await.unwrap().is_empty());
    }
}
