//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the demo runs with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use duet_shared::constants::{HEARTBEAT_INTERVAL_SECS, ONLINE_THRESHOLD_MS};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// SQLite database file.
    /// Env: `DUET_DB_PATH`
    /// Default: platform data directory (`duet.db`).
    pub db_path: Option<PathBuf>,

    /// Image host upload endpoint.
    /// Env: `DUET_UPLOAD_URL`
    pub upload_url: String,

    /// Unsigned upload preset sent with every image.
    /// Env: `DUET_UPLOAD_PRESET`
    pub upload_preset: String,

    /// Presence heartbeat interval.
    /// Env: `DUET_HEARTBEAT_SECS`
    /// Default: 60 seconds.
    pub heartbeat_interval: Duration,

    /// How recently a user must have been seen to count as online.
    /// Env: `DUET_ONLINE_THRESHOLD_MS`
    /// Default: 70000.
    pub online_threshold_ms: i64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            upload_url: "http://127.0.0.1:8080/upload".to_string(),
            upload_preset: "duet".to_string(),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            online_threshold_ms: ONLINE_THRESHOLD_MS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("DUET_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(url) = lookup("DUET_UPLOAD_URL") {
            config.upload_url = url;
        }

        if let Some(preset) = lookup("DUET_UPLOAD_PRESET") {
            config.upload_preset = preset;
        }

        if let Some(val) = lookup("DUET_HEARTBEAT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.heartbeat_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid DUET_HEARTBEAT_SECS, using default"),
            }
        }

        if let Some(val) = lookup("DUET_ONLINE_THRESHOLD_MS") {
            match val.parse::<i64>() {
                Ok(ms) if ms >= 0 => config.online_threshold_ms = ms,
                _ => tracing::warn!(value = %val, "Invalid DUET_ONLINE_THRESHOLD_MS, using default"),
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }
}
