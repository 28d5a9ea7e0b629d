//! Document shapes exchanged with the remote store.
//!
//! Every struct serializes in camelCase and tolerates missing fields, so a
//! document another client wrote partially still decodes on push.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{CHATS_FIELD, IMAGE_PREVIEW_MARKER, MESSAGES_FIELD, PREVIEW_MAX_CHARS};
use crate::error::ModelError;
use crate::types::{ConversationId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user profile, stored at `users/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    /// Unique lowercase handle used for discovery.
    pub handle: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub bio: String,
    /// Epoch millis of the last heartbeat written by the owner's session.
    #[serde(default)]
    pub last_seen_at: i64,
}

impl User {
    pub fn new(id: UserId, handle: &str) -> Self {
        Self {
            id,
            handle: handle.trim().to_lowercase(),
            display_name: String::new(),
            avatar_ref: None,
            bio: String::new(),
            last_seen_at: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation index
// ---------------------------------------------------------------------------

/// One participant's view of a conversation, held in that participant's index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    /// The *other* participant, from the owner's perspective.
    pub counterpart_id: UserId,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub unread: bool,
}

impl ConversationSummary {
    pub fn new(conversation_id: ConversationId, counterpart_id: UserId, updated_at: i64) -> Self {
        Self {
            conversation_id,
            counterpart_id,
            last_message: String::new(),
            updated_at,
            unread: false,
        }
    }
}

/// The index document stored at `chats/{userId}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatIndex {
    #[serde(default)]
    pub chats_data: Vec<ConversationSummary>,
}

impl ChatIndex {
    /// Decode an index document entry by entry. An absent document decodes
    /// as empty; entries that do not decode are left out and counted.
    pub fn from_doc(doc: Option<&Value>) -> Decoded<Self> {
        let (chats_data, skipped) = decode_elements(doc, CHATS_FIELD);
        Decoded {
            value: Self { chats_data },
            skipped,
        }
    }

    pub fn find(&self, conversation_id: &ConversationId) -> Option<&ConversationSummary> {
        self.chats_data
            .iter()
            .find(|c| &c.conversation_id == conversation_id)
    }

    pub fn has_counterpart(&self, user_id: &UserId) -> bool {
        self.chats_data.iter().any(|c| &c.counterpart_id == user_id)
    }
}

/// A summary joined with the counterpart's current profile, as shown in a
/// conversation list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    #[serde(flatten)]
    pub summary: ConversationSummary,
    /// `None` when the profile lookup found nothing or failed.
    pub counterpart: Option<User>,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A single chat message. Exactly one of `body` / `image_ref` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Borrowed view of what a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageContent<'a> {
    Text(&'a str),
    Image(&'a str),
}

impl Message {
    pub fn text(sender_id: UserId, body: impl Into<String>) -> Result<Self, ModelError> {
        let body = body.into();
        if body.is_empty() {
            return Err(ModelError::InvalidMessage("text body is empty"));
        }
        Ok(Self {
            sender_id,
            body: Some(body),
            image_ref: None,
            created_at: Utc::now(),
        })
    }

    pub fn image(sender_id: UserId, image_ref: impl Into<String>) -> Result<Self, ModelError> {
        let image_ref = image_ref.into();
        if image_ref.is_empty() {
            return Err(ModelError::InvalidMessage("image reference is empty"));
        }
        Ok(Self {
            sender_id,
            body: None,
            image_ref: Some(image_ref),
            created_at: Utc::now(),
        })
    }

    /// What the message carries. An image wins if a foreign client set both.
    pub fn content(&self) -> Option<MessageContent<'_>> {
        match (&self.body, &self.image_ref) {
            (_, Some(url)) => Some(MessageContent::Image(url)),
            (Some(text), None) => Some(MessageContent::Text(text)),
            (None, None) => None,
        }
    }
}

impl MessageContent<'_> {
    /// Conversation-list preview: the first 30 characters of text, or the
    /// image marker regardless of any text.
    pub fn preview(&self) -> String {
        match self {
            MessageContent::Text(text) => text.chars().take(PREVIEW_MAX_CHARS).collect(),
            MessageContent::Image(_) => IMAGE_PREVIEW_MARKER.to_string(),
        }
    }
}

/// The shared log document stored at `messages/{conversationId}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationLog {
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Chronological append order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl ConversationLog {
    pub fn empty() -> Self {
        Self {
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Decode a log document message by message. An absent document decodes
    /// as empty; messages that do not decode are left out and counted.
    pub fn from_doc(doc: Option<&Value>) -> Decoded<Self> {
        let created_at = doc
            .and_then(|d| d.get("createdAt"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_else(Utc::now);
        let (messages, skipped) = decode_elements(doc, MESSAGES_FIELD);
        Decoded {
            value: Self {
                created_at,
                messages,
            },
            skipped,
        }
    }

    /// Messages newest first, the order consumers render from.
    pub fn newest_first(self) -> Vec<Message> {
        let mut messages = self.messages;
        messages.reverse();
        messages
    }
}

// ---------------------------------------------------------------------------
// Lenient decoding
// ---------------------------------------------------------------------------

/// A document decoded element by element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T> {
    pub value: T,
    /// Array elements that did not decode and were left out.
    pub skipped: usize,
}

/// Decode the array at `field` one element at a time.
///
/// A missing document or field reads as empty. A field holding something
/// other than an array reads as empty with one skipped element.
pub fn decode_elements<T: DeserializeOwned>(doc: Option<&Value>, field: &str) -> (Vec<T>, usize) {
    let items = match doc.and_then(|d| d.get(field)) {
        None | Some(Value::Null) => return (Vec::new(), 0),
        Some(Value::Array(items)) => items,
        Some(_) => return (Vec::new(), 1),
    };

    let mut decoded = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for item in items {
        match serde_json::from_value(item.clone()) {
            Ok(value) => decoded.push(value),
            Err(_) => skipped += 1,
        }
    }
    (decoded, skipped)
}

/// Serialize a model into a store document.
pub fn to_doc<T: Serialize>(value: &T) -> Result<Value, ModelError> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_preview_truncates_to_30_chars() {
        let text = "a".repeat(45);
        let msg = Message::text(UserId::from("alice"), text.clone()).unwrap();
        let preview = msg.content().unwrap().preview();
        assert_eq!(preview, &text[..30]);
    }

    #[test]
    fn test_preview_counts_chars_not_bytes() {
        let text = "é".repeat(40);
        let preview = MessageContent::Text(&text).preview();
        assert_eq!(preview.chars().count(), 30);
    }

    #[test]
    fn test_image_preview_ignores_text() {
        let msg = Message {
            sender_id: UserId::from("alice"),
            body: Some("caption".into()),
            image_ref: Some("https://cdn.example/a.png".into()),
            created_at: Utc::now(),
        };
        assert_eq!(msg.content().unwrap().preview(), IMAGE_PREVIEW_MARKER);
    }

    #[test]
    fn test_empty_messages_rejected() {
        assert!(Message::text(UserId::from("alice"), "").is_err());
        assert!(Message::image(UserId::from("alice"), "").is_err());
    }

    #[test]
    fn test_index_missing_array_is_empty() {
        let index = ChatIndex::from_doc(Some(&json!({})));
        assert!(index.value.chats_data.is_empty());
        assert_eq!(index.skipped, 0);
        assert!(ChatIndex::from_doc(None).value.chats_data.is_empty());
    }

    #[test]
    fn test_index_skips_only_the_broken_entry() {
        let doc = json!({"chatsData": [
            {"conversationId": "c1", "counterpartId": "bob", "updatedAt": 1},
            {"conversationId": "c2"},
            {"conversationId": "c3", "counterpartId": "carol"},
        ]});
        let index = ChatIndex::from_doc(Some(&doc));
        assert_eq!(index.skipped, 1);
        let ids: Vec<_> = index
            .value
            .chats_data
            .iter()
            .map(|c| c.conversation_id.as_str())
            .collect();
        assert_eq!(ids, ["c1", "c3"]);
    }

    #[test]
    fn test_log_skips_partial_message() {
        let good = to_doc(&Message::text(UserId::from("alice"), "hello").unwrap()).unwrap();
        let doc = json!({"messages": [good, {"senderId": "bob", "body": "yo"}]});
        let log = ConversationLog::from_doc(Some(&doc));
        assert_eq!(log.skipped, 1);
        assert_eq!(log.value.messages.len(), 1);
        assert_eq!(log.value.messages[0].body.as_deref(), Some("hello"));
    }

    #[test]
    fn test_non_array_field_reads_empty() {
        let log = ConversationLog::from_doc(Some(&json!({"messages": "oops"})));
        assert!(log.value.messages.is_empty());
        assert_eq!(log.skipped, 1);
    }

    #[test]
    fn test_summary_wire_names() {
        let summary = ConversationSummary::new("c1".into(), "bob".into(), 42);
        let value = to_doc(&summary).unwrap();
        assert_eq!(value["conversationId"], "c1");
        assert_eq!(value["counterpartId"], "bob");
        assert_eq!(value["updatedAt"], 42);
        assert_eq!(value["unread"], false);
    }

    #[test]
    fn test_log_newest_first() {
        let mut log = ConversationLog::empty();
        for body in ["one", "two", "three"] {
            log.messages
                .push(Message::text(UserId::from("alice"), body).unwrap());
        }
        let bodies: Vec<_> = log
            .newest_first()
            .into_iter()
            .filter_map(|m| m.body)
            .collect();
        assert_eq!(bodies, ["three", "two", "one"]);
    }
}
