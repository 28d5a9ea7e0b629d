//! Profile bootstrap and editing.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use duet_shared::constants::{
    HANDLE_FIELD, PROFILE_LOAD_ATTEMPTS, PROFILE_LOAD_BACKOFF_MS, USERS_COLLECTION,
};
use duet_shared::models::to_doc;
use duet_shared::{now_millis, User, UserId};
use duet_store::DocumentStore;

use crate::error::{ClientError, Result};
use crate::index::create_index;
use crate::presence;
use crate::session::SessionContext;
use crate::upload::MediaUploader;

/// How long to wait for a profile that signup has not finished writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: PROFILE_LOAD_ATTEMPTS,
            backoff: Duration::from_millis(PROFILE_LOAD_BACKOFF_MS),
        }
    }
}

/// Whether a loaded profile is ready for chatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStatus {
    /// Display name and avatar are both set.
    Complete,
    /// The user still has to fill in their profile.
    NeedsSetup,
}

impl ProfileStatus {
    pub fn of(user: &User) -> Self {
        if !user.display_name.is_empty() && user.avatar_ref.is_some() {
            ProfileStatus::Complete
        } else {
            ProfileStatus::NeedsSetup
        }
    }
}

/// Fields a user can change on their own profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileEdit {
    pub display_name: String,
    pub bio: String,
}

/// New avatar image to upload along with a profile edit.
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Create the profile and empty index for a freshly signed-up user.
///
/// Handles are unique. Registering the same user again with its own handle
/// is allowed.
pub async fn register(store: &dyn DocumentStore, user_id: &UserId, handle: &str) -> Result<User> {
    let mut user = User::new(user_id.clone(), handle);
    if user.handle.is_empty() {
        return Err(ClientError::InvalidRequest("Handle cannot be empty".into()));
    }

    let holders = store
        .find_by_field(USERS_COLLECTION, HANDLE_FIELD, &Value::String(user.handle.clone()))
        .await?;
    let taken = holders
        .iter()
        .any(|doc| doc.get("id").and_then(Value::as_str) != Some(user_id.as_str()));
    if taken {
        warn!(user = %user_id.short(), handle = %user.handle, "Handle already taken");
        return Err(ClientError::InvalidRequest("Handle already taken".into()));
    }
    user.last_seen_at = now_millis();

    store
        .set(USERS_COLLECTION, user_id.as_str(), to_doc(&user)?)
        .await?;
    create_index(store, user_id).await?;

    info!(user = %user_id.short(), handle = %user.handle, "User registered");
    Ok(user)
}

/// Read a user's profile, `None` if absent.
pub async fn fetch_user(store: &dyn DocumentStore, user_id: &UserId) -> Result<Option<User>> {
    match store.get(USERS_COLLECTION, user_id.as_str()).await? {
        Some(doc) => Ok(Some(
            serde_json::from_value(doc).map_err(duet_shared::ModelError::from)?,
        )),
        None => Ok(None),
    }
}

/// Load the session user's profile and mark them as seen.
///
/// Retries while the profile is absent, since the signup write may still be
/// in flight when the session starts.
pub async fn load_profile(
    store: &dyn DocumentStore,
    session: &SessionContext,
    retry: RetryPolicy,
) -> Result<(User, ProfileStatus)> {
    let user_id = session.user_id();
    let attempts = retry.attempts.max(1);

    for attempt in 1..=attempts {
        if let Some(mut user) = fetch_user(store, user_id).await? {
            presence::touch(store, user_id).await?;
            user.last_seen_at = now_millis().max(user.last_seen_at);

            let status = ProfileStatus::of(&user);
            debug!(user = %user_id.short(), ?status, "Profile loaded");
            return Ok((user, status));
        }

        if attempt < attempts {
            debug!(user = %user_id.short(), attempt, "Profile not there yet, retrying");
            tokio::time::sleep(retry.backoff).await;
        }
    }

    warn!(user = %user_id.short(), attempts, "Profile never appeared");
    Err(ClientError::NotFound(format!("Profile {user_id}")))
}

/// Apply a profile edit, uploading a new avatar first when one is given.
///
/// A failed upload aborts the edit before anything is written. Without a new
/// avatar the previous one is kept.
pub async fn update_profile(
    store: &dyn DocumentStore,
    session: &SessionContext,
    edit: ProfileEdit,
    avatar: Option<AvatarUpload>,
    uploader: &dyn MediaUploader,
) -> Result<User> {
    let user_id = session.user_id();
    let current = fetch_user(store, user_id)
        .await?
        .ok_or_else(|| ClientError::NotFound(format!("Profile {user_id}")))?;

    let avatar_ref = match avatar {
        Some(upload) => Some(uploader.upload(&upload.file_name, upload.bytes).await?),
        None => current.avatar_ref,
    };

    store
        .update_merge(
            USERS_COLLECTION,
            user_id.as_str(),
            json!({
                "displayName": edit.display_name,
                "bio": edit.bio,
                "avatarRef": avatar_ref,
            }),
        )
        .await?;

    info!(user = %user_id.short(), "Profile updated");
    fetch_user(store, user_id)
        .await?
        .ok_or_else(|| ClientError::NotFound(format!("Profile {user_id}")))
}
