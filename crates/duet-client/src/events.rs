use serde::Serialize;
use tokio::sync::broadcast;

pub const EVENT_NOTIFICATION: &str = "notification";
pub const EVENT_CONVERSATION_OPENED: &str = "conversation-opened";
pub const EVENT_MESSAGE_SENT: &str = "message-sent";
pub const EVENT_UPLOAD_STATE_CHANGED: &str = "upload-state-changed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationOpenedPayload {
    pub conversation_id: String,
    pub counterpart_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSentPayload {
    pub conversation_id: String,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadStatePayload {
    pub uploading: bool,
}

/// Everything a session reports to the UI besides the feeds themselves.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum ClientEvent {
    Notification(NotificationPayload),
    ConversationOpened(ConversationOpenedPayload),
    MessageSent(MessageSentPayload),
    UploadStateChanged(UploadStatePayload),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Notification(_) => EVENT_NOTIFICATION,
            ClientEvent::ConversationOpened(_) => EVENT_CONVERSATION_OPENED,
            ClientEvent::MessageSent(_) => EVENT_MESSAGE_SENT,
            ClientEvent::UploadStateChanged(_) => EVENT_UPLOAD_STATE_CHANGED,
        }
    }

    pub fn notification(severity: Severity, message: impl Into<String>) -> Self {
        ClientEvent::Notification(NotificationPayload {
            severity,
            message: message.into(),
        })
    }
}

pub fn emit_event(tx: &broadcast::Sender<ClientEvent>, event: ClientEvent) {
    let name = event.name();
    // No receivers just means no UI is listening right now.
    if tx.send(event).is_err() {
        tracing::trace!(event = name, "No event listeners");
    }
}
