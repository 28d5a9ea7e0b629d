use thiserror::Error;

use duet_shared::{ConversationId, ModelError, UserId};
use duet_store::StoreError;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Transient or permanent failure of a store call.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid document: {0}")]
    Model(#[from] ModelError),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The media collaborator failed; nothing was written.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// One of the two mirrored index writes failed after the other landed.
    /// The two participants' indexes now disagree until repaired.
    #[error("Index write for {failed_owner} failed in conversation {conversation_id}: {source}")]
    PartialWrite {
        conversation_id: ConversationId,
        failed_owner: UserId,
        #[source]
        source: StoreError,
    },

    #[error("No conversation is open")]
    NoActiveConversation,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Single human-readable line suitable for a toast notification.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Store(e) if e.is_not_found() => "That conversation no longer exists".into(),
            ClientError::Store(_) => "Could not reach the server, please try again".into(),
            ClientError::Model(_) => "Received data the app could not read".into(),
            ClientError::NotFound(what) => format!("{what} not found"),
            ClientError::Upload(_) => "Image upload failed".into(),
            ClientError::PartialWrite { .. } => {
                "Message sent, but the conversation list may be out of date".into()
            }
            ClientError::NoActiveConversation => "Open a conversation first".into(),
            ClientError::InvalidRequest(reason) => reason.clone(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
