//! Data model, identifiers, and constants shared by the Duet crates.

pub mod constants;
pub mod error;
pub mod models;
pub mod types;

pub use error::ModelError;
pub use models::{
    ChatIndex, ConversationEntry, ConversationLog, ConversationSummary, Decoded, Message,
    MessageContent, User,
};
pub use types::{now_millis, ConversationId, UserId};
