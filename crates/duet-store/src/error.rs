use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An update targeted a document that does not exist.
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored or supplied document is not valid JSON for the operation.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Documents and merge payloads must be JSON objects.
    #[error("Expected a JSON object for {0}")]
    NotAnObject(String),

    /// An array-append targeted a field holding something other than an array.
    #[error("Field `{0}` is not an array")]
    NotAnArray(String),

    /// The backend could not be reached (network, poisoned lock, closed handle).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
