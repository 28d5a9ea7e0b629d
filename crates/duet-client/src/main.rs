//! # duet-demo
//!
//! Runs two sessions against one local store: alice finds bob by handle,
//! opens a conversation, and sends a message while both feeds print what
//! they observe.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use duet_client::profile::{load_profile, register, RetryPolicy};
use duet_client::{
    init_tracing, ChatSession, ClientConfig, HttpUploader, MediaUploader, SessionContext,
};
use duet_shared::UserId;
use duet_store::{DocumentStore, SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing and configuration
    // -----------------------------------------------------------------------
    init_tracing();
    info!("Starting duet demo v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 2. Store and collaborators
    // -----------------------------------------------------------------------
    let store = match &config.db_path {
        Some(path) => SqliteStore::open_at(path),
        None => SqliteStore::open_default(),
    }
    .context("Failed to open document store")?;
    let store: Arc<dyn DocumentStore> = Arc::new(store);
    let uploader: Arc<dyn MediaUploader> =
        Arc::new(HttpUploader::new(&config.upload_url, &config.upload_preset));

    // -----------------------------------------------------------------------
    // 3. Two users sign up
    // -----------------------------------------------------------------------
    register(store.as_ref(), &UserId::from("demo-alice"), "alice").await?;
    register(store.as_ref(), &UserId::from("demo-bob"), "bob").await?;

    let mut alice = ChatSession::new(
        store.clone(),
        SessionContext::new("demo-alice"),
        uploader.clone(),
    )
    .with_online_threshold(config.online_threshold_ms);
    let bob = ChatSession::new(store.clone(), SessionContext::new("demo-bob"), uploader)
        .with_online_threshold(config.online_threshold_ms);

    let (me, status) =
        load_profile(store.as_ref(), alice.session(), RetryPolicy::default()).await?;
    info!(handle = %me.handle, ?status, "Signed in");
    let _heartbeat = alice.start_heartbeat(config.heartbeat_interval);

    // -----------------------------------------------------------------------
    // 4. Alice finds bob and says hi
    // -----------------------------------------------------------------------
    let other = alice
        .resolve_by_handle("bob")
        .await?
        .context("bob is not reachable from alice")?;

    let mut feed = alice.create_conversation(&other).await?;
    feed.next().await;

    alice.set_draft("hi");
    alice.send_text().await?;

    if let Some(messages) = feed.next().await {
        for message in &messages {
            let text = message.body.as_deref().unwrap_or("<image>");
            println!("[log] {}: {text}", message.sender_id);
        }
    }

    for (name, session) in [("alice", &alice), ("bob", &bob)] {
        let mut view = session.live_view().await?;
        if let Some(entries) = view.next().await {
            for entry in entries {
                let with = entry
                    .counterpart
                    .as_ref()
                    .map(|u| u.handle.as_str())
                    .unwrap_or("?");
                println!(
                    "[{name}] with {with}: {:?} unread={}",
                    entry.summary.last_message, entry.summary.unread
                );
            }
        }
    }

    println!("bob online: {}", alice.counterpart_online().await?);
    Ok(())
}
