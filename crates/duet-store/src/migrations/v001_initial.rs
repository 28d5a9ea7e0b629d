//! v001 -- Initial schema creation.
//!
//! Creates the `documents` table holding every JSON document keyed by
//! collection and id.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Documents
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,                 -- users / chats / messages
    id         TEXT NOT NULL,
    json       TEXT NOT NULL,                 -- serialized JSON object
    updated_at TEXT NOT NULL,                 -- RFC-3339

    PRIMARY KEY (collection, id)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
