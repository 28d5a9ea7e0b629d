//! Two-party chat sync engine.
//!
//! Keeps each user's conversation index and every conversation's shared
//! message log in step across clients through a push-based
//! [`DocumentStore`](duet_store::DocumentStore).

pub mod chat;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod index;
pub mod messages;
pub mod presence;
pub mod profile;
pub mod repair;
pub mod session;
pub mod upload;

pub use chat::ChatSession;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use events::ClientEvent;
pub use index::ConversationFeed;
pub use messages::MessageFeed;
pub use presence::Heartbeat;
pub use session::SessionContext;
pub use upload::{HttpUploader, MediaUploader};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("duet_client=debug,duet_store=info,warn"));

    // A subscriber may already be installed by an embedding application.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
