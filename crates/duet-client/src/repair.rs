//! Reconciliation of half-written conversations.
//!
//! Creating a conversation and sending a message both write several documents
//! without a transaction. This pass walks the session user's index, reports
//! where the other documents disagree with it, and fills in what is missing.

use std::fmt;

use tracing::{info, warn};

use duet_shared::{ConversationId, ConversationSummary, UserId};
use duet_store::DocumentStore;

use crate::error::Result;
use crate::index::{add_entry, load_index};
use crate::messages;
use crate::session::SessionContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// The caller's summary points at a log that does not exist.
    MissingLog { conversation_id: ConversationId },
    /// The counterpart's index has no entry for the conversation.
    MissingMirror {
        summary: ConversationSummary,
        owner: UserId,
    },
    /// The counterpart's entry names someone other than the caller.
    MisdirectedMirror {
        conversation_id: ConversationId,
        owner: UserId,
        points_at: UserId,
    },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inconsistency::MissingLog { conversation_id } => {
                write!(f, "conversation {conversation_id} has no message log")
            }
            Inconsistency::MissingMirror { summary, owner } => write!(
                f,
                "{owner} is missing conversation {}",
                summary.conversation_id
            ),
            Inconsistency::MisdirectedMirror {
                conversation_id,
                owner,
                points_at,
            } => write!(
                f,
                "{owner}'s entry for {conversation_id} points at {points_at}"
            ),
        }
    }
}

/// Compare the caller's index against the logs and counterpart mirrors.
pub async fn scan(store: &dyn DocumentStore, session: &SessionContext) -> Result<Vec<Inconsistency>> {
    let me = session.user_id();
    let index = load_index(store, me).await?;
    let mut findings = Vec::new();

    for summary in index.chats_data {
        if !messages::log_exists(store, &summary.conversation_id).await? {
            findings.push(Inconsistency::MissingLog {
                conversation_id: summary.conversation_id.clone(),
            });
        }

        let owner = summary.counterpart_id.clone();
        let theirs = load_index(store, &owner).await?;
        match theirs.find(&summary.conversation_id) {
            None => findings.push(Inconsistency::MissingMirror { summary, owner }),
            Some(mirror) if &mirror.counterpart_id != me => {
                findings.push(Inconsistency::MisdirectedMirror {
                    conversation_id: summary.conversation_id.clone(),
                    owner,
                    points_at: mirror.counterpart_id.clone(),
                })
            }
            Some(_) => {}
        }
    }

    for finding in &findings {
        warn!(user = %me.short(), "{finding}");
    }
    Ok(findings)
}

/// Fix what [`scan`] found. Returns the number of fixes applied.
///
/// Missing logs are created empty and missing mirrors are appended with the
/// caller's preview and timestamp. Misdirected mirrors are left alone.
pub async fn repair(
    store: &dyn DocumentStore,
    session: &SessionContext,
    findings: &[Inconsistency],
) -> Result<usize> {
    let mut fixed = 0;

    for finding in findings {
        match finding {
            Inconsistency::MissingLog { conversation_id } => {
                if messages::ensure_log(store, conversation_id).await? {
                    fixed += 1;
                }
            }
            Inconsistency::MissingMirror { summary, owner } => {
                // Another pass may have fixed it in the meantime.
                let theirs = load_index(store, owner).await?;
                if theirs.find(&summary.conversation_id).is_some() {
                    continue;
                }

                let mut mirror = ConversationSummary::new(
                    summary.conversation_id.clone(),
                    session.user_id().clone(),
                    summary.updated_at,
                );
                mirror.last_message = summary.last_message.clone();
                add_entry(store, owner, &mirror).await?;
                fixed += 1;
            }
            Inconsistency::MisdirectedMirror { .. } => {}
        }
    }

    info!(user = %session.user_id().short(), fixed, "Reconciliation finished");
    Ok(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::create_index;
    use duet_store::MemoryStore;

    async fn half_created(store: &MemoryStore) -> ConversationId {
        create_index(store, &"alice".into()).await.unwrap();
        create_index(store, &"bob".into()).await.unwrap();

        let id = ConversationId::new();
        let mut mine = ConversationSummary::new(id.clone(), "bob".into(), 5);
        mine.last_message = "hi".into();
        add_entry(store, &"alice".into(), &mine).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_clean_index_has_no_findings() {
        let store = MemoryStore::new();
        let id = half_created(&store).await;
        messages::create_log(&store, &id).await.unwrap();
        add_entry(
            &store,
            &"bob".into(),
            &ConversationSummary::new(id, "alice".into(), 5),
        )
        .await
        .unwrap();

        let findings = scan(&store, &SessionContext::new("alice")).await.unwrap();
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_repairs_missing_log_and_mirror() {
        let store = MemoryStore::new();
        let id = half_created(&store).await;
        let session = SessionContext::new("alice");

        let findings = scan(&store, &session).await.unwrap();
        assert_eq!(findings.len(), 2);

        assert_eq!(repair(&store, &session, &findings).await.unwrap(), 2);
        assert!(scan(&store, &session).await.unwrap().is_empty());

        let bob = load_index(&store, &"bob".into()).await.unwrap();
        let mirror = bob.find(&id).unwrap();
        assert_eq!(mirror.counterpart_id, UserId::from("alice"));
        assert_eq!(mirror.last_message, "hi");
        assert_eq!(mirror.updated_at, 5);
        assert!(!mirror.unread);

        // Replaying the same findings changes nothing.
        assert_eq!(repair(&store, &session, &findings).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_misdirected_mirror_is_reported_only() {
        let store = MemoryStore::new();
        let id = half_created(&store).await;
        messages::create_log(&store, &id).await.unwrap();
        add_entry(
            &store,
            &"bob".into(),
            &ConversationSummary::new(id.clone(), "carol".into(), 5),
        )
        .await
        .unwrap();
        let session = SessionContext::new("alice");

        let findings = scan(&store, &session).await.unwrap();
        assert_eq!(
            findings,
            vec![Inconsistency::MisdirectedMirror {
                conversation_id: id,
                owner: "bob".into(),
                points_at: "carol".into(),
            }]
        );
        assert_eq!(repair(&store, &session, &findings).await.unwrap(), 0);
    }
}
