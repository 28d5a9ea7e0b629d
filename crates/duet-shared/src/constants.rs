/// Application name
pub const APP_NAME: &str = "Duet";

/// Collection holding one profile document per user
pub const USERS_COLLECTION: &str = "users";

/// Collection holding one conversation index document per user
pub const CHATS_COLLECTION: &str = "chats";

/// Collection holding one message log document per conversation
pub const MESSAGES_COLLECTION: &str = "messages";

/// Array field of an index document
pub const CHATS_FIELD: &str = "chatsData";

/// Array field of a message log document
pub const MESSAGES_FIELD: &str = "messages";

/// Profile field matched by handle lookups
pub const HANDLE_FIELD: &str = "handle";

/// Profile field written by the presence heartbeat
pub const LAST_SEEN_FIELD: &str = "lastSeenAt";

/// Maximum preview length in characters
pub const PREVIEW_MAX_CHARS: usize = 30;

/// Preview shown for image messages
pub const IMAGE_PREVIEW_MARKER: &str = "image";

/// Presence heartbeat interval in seconds
pub const HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// A user is online if seen within this many milliseconds
pub const ONLINE_THRESHOLD_MS: i64 = 70_000;

/// Profile load retries while the signup write is still in flight
pub const PROFILE_LOAD_ATTEMPTS: u32 = 10;
pub const PROFILE_LOAD_BACKOFF_MS: u64 = 300;

/// Maximum image upload size in bytes (10 MiB)
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;
