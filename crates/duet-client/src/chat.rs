//! The operations and observable state a chat UI drives.
//!
//! A [`ChatSession`] owns the per-window state (open conversation, draft,
//! upload flag) and reports failures as [`ClientEvent::Notification`]s in
//! addition to returning them, so a UI can simply render the event stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use duet_shared::constants::ONLINE_THRESHOLD_MS;
use duet_shared::{now_millis, ConversationSummary, Message, User};
use duet_store::DocumentStore;

use crate::directory;
use crate::error::{ClientError, Result};
use crate::events::{
    emit_event, ClientEvent, ConversationOpenedPayload, MessageSentPayload, Severity,
    UploadStatePayload,
};
use crate::index::{self, ConversationFeed};
use crate::messages::{self, MessageFeed};
use crate::presence::{self, Heartbeat};
use crate::profile::fetch_user;
use crate::session::SessionContext;
use crate::upload::MediaUploader;

const EVENT_CAPACITY: usize = 64;

pub struct ChatSession {
    store: Arc<dyn DocumentStore>,
    session: SessionContext,
    uploader: Arc<dyn MediaUploader>,
    active: Option<ConversationSummary>,
    draft: String,
    uploading: watch::Sender<bool>,
    events: broadcast::Sender<ClientEvent>,
    online_threshold_ms: i64,
}

impl ChatSession {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        session: SessionContext,
        uploader: Arc<dyn MediaUploader>,
    ) -> Self {
        let (uploading, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            session,
            uploader,
            active: None,
            draft: String::new(),
            uploading,
            events,
            online_threshold_ms: ONLINE_THRESHOLD_MS,
        }
    }

    pub fn with_online_threshold(mut self, threshold_ms: i64) -> Self {
        self.online_threshold_ms = threshold_ms;
        self
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn active(&self) -> Option<&ConversationSummary> {
        self.active.as_ref()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Watch the "image upload in progress" flag.
    pub fn uploading(&self) -> watch::Receiver<bool> {
        self.uploading.subscribe()
    }

    pub fn is_uploading(&self) -> bool {
        *self.uploading.borrow()
    }

    /// Start refreshing this user's presence.
    pub fn start_heartbeat(&self, every: Duration) -> Heartbeat {
        Heartbeat::start(self.store.clone(), self.session.user_id().clone(), every)
    }

    // -- Directory --

    pub async fn resolve_by_handle(&self, handle: &str) -> Result<Option<User>> {
        directory::resolve_by_handle(self.store.as_ref(), &self.session, handle)
            .await
            .map_err(|e| self.report(e))
    }

    /// Start a conversation with `other`, make it active, and open its feed.
    pub async fn create_conversation(&mut self, other: &User) -> Result<MessageFeed> {
        let summary = directory::create_conversation(self.store.as_ref(), &self.session, other)
            .await
            .map_err(|e| self.report(e))?;
        self.open_conversation(summary).await
    }

    /// Make `summary` the active conversation and open its message feed.
    pub async fn open_conversation(&mut self, summary: ConversationSummary) -> Result<MessageFeed> {
        let feed = directory::open_conversation(self.store.as_ref(), &summary)
            .await
            .map_err(|e| self.report(e))?;

        emit_event(
            &self.events,
            ClientEvent::ConversationOpened(ConversationOpenedPayload {
                conversation_id: summary.conversation_id.to_string(),
                counterpart_id: summary.counterpart_id.to_string(),
            }),
        );
        debug!(conversation = %summary.conversation_id, "Conversation active");
        self.active = Some(summary);
        Ok(feed)
    }

    // -- Feeds --

    pub async fn live_view(&self) -> Result<ConversationFeed> {
        index::live_view(self.store.clone(), &self.session)
            .await
            .map_err(|e| self.report(e))
    }

    /// Message feed of the active conversation.
    pub async fn messages(&self) -> Result<MessageFeed> {
        let active = self.require_active()?;
        messages::subscribe(self.store.as_ref(), &active.conversation_id)
            .await
            .map_err(|e| self.report(e))
    }

    /// Whether the active conversation's counterpart was seen recently.
    pub async fn counterpart_online(&self) -> Result<bool> {
        let active = self.require_active()?;
        let user = fetch_user(self.store.as_ref(), &active.counterpart_id)
            .await
            .map_err(|e| self.report(e))?;
        let Some(user) = user else {
            return Ok(false);
        };
        Ok(presence::is_online(
            user.last_seen_at,
            now_millis(),
            self.online_threshold_ms,
        ))
    }

    // -- Sending --

    /// Send the current draft as a text message.
    ///
    /// An empty draft does nothing. The draft is cleared once the message is
    /// in the log and kept if the append fails.
    pub async fn send_text(&mut self) -> Result<()> {
        if self.draft.is_empty() {
            return Ok(());
        }
        let active = self.require_active()?.clone();

        let message = Message::text(self.session.user_id().clone(), self.draft.clone())
            .map_err(|e| self.report(e.into()))?;
        self.append(&active, &message).await?;
        self.draft.clear();

        self.finish_send(&active, &message).await
    }

    /// Upload an image and send it as a message.
    ///
    /// If the upload fails nothing is appended and no index changes.
    pub async fn send_image(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<()> {
        let active = self.require_active()?.clone();

        self.set_uploading(true);
        let uploaded = self.uploader.upload(file_name, bytes).await;
        self.set_uploading(false);

        let url = uploaded.map_err(|e| self.report(e))?;
        let message = Message::image(self.session.user_id().clone(), url)
            .map_err(|e| self.report(e.into()))?;
        self.append(&active, &message).await?;

        self.finish_send(&active, &message).await
    }

    async fn append(&self, active: &ConversationSummary, message: &Message) -> Result<()> {
        messages::append(self.store.as_ref(), &active.conversation_id, message)
            .await
            .map_err(|e| self.report(e))
    }

    /// Update both index mirrors for a message already in the log.
    ///
    /// A partial mirror update still counts as sent.
    async fn finish_send(&self, active: &ConversationSummary, message: &Message) -> Result<()> {
        let preview = message.content().map(index::preview).unwrap_or_default();

        let outcome = index::send_side_effect(
            self.store.as_ref(),
            &active.conversation_id,
            self.session.user_id(),
            &active.counterpart_id,
            &preview,
        )
        .await;

        match outcome {
            Ok(()) => {}
            Err(e @ ClientError::PartialWrite { .. }) => {
                self.report(e);
            }
            Err(e) => return Err(self.report(e)),
        }

        emit_event(
            &self.events,
            ClientEvent::MessageSent(MessageSentPayload {
                conversation_id: active.conversation_id.to_string(),
                preview,
            }),
        );
        Ok(())
    }

    fn require_active(&self) -> Result<&ConversationSummary> {
        self.active
            .as_ref()
            .ok_or_else(|| self.report(ClientError::NoActiveConversation))
    }

    fn set_uploading(&self, uploading: bool) {
        self.uploading.send_replace(uploading);
        emit_event(
            &self.events,
            ClientEvent::UploadStateChanged(UploadStatePayload { uploading }),
        );
    }

    /// Raise a notification for `err` and hand it back for propagation.
    fn report(&self, err: ClientError) -> ClientError {
        let severity = match err {
            ClientError::PartialWrite { .. } => Severity::Warning,
            _ => Severity::Error,
        };
        warn!(user = %self.session.user_id().short(), error = %err, "Operation failed");
        emit_event(
            &self.events,
            ClientEvent::notification(severity, err.user_message()),
        );
        err
    }
}
