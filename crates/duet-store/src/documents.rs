//! Row-level access to the `documents` table.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use crate::database::Database;
use crate::error::Result;

impl Database {
    pub fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT json FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn put_document(&self, collection: &str, id: &str, doc: &Value) -> Result<()> {
        self.conn().execute(
            "INSERT INTO documents (collection, id, json, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (collection, id)
             DO UPDATE SET json = excluded.json, updated_at = excluded.updated_at",
            params![
                collection,
                id,
                serde_json::to_string(doc)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insert a document unless the row already exists. Returns whether it was inserted.
    pub fn insert_document_if_absent(&self, collection: &str, id: &str, doc: &Value) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT INTO documents (collection, id, json, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (collection, id) DO NOTHING",
            params![
                collection,
                id,
                serde_json::to_string(doc)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Documents of `collection` whose top-level scalar `field` equals `value`.
    pub fn find_documents(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Value>> {
        let mut stmt = self.conn().prepare(
            "SELECT json FROM documents
             WHERE collection = ?1
               AND json_extract(json, ?2) = json_extract(?3, '$')",
        )?;

        let path = format!("$.{field}");
        let rows = stmt.query_map(
            params![collection, path, serde_json::to_string(value)?],
            |row| row.get::<_, String>(0),
        )?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(serde_json::from_str(&row?)?);
        }
        Ok(docs)
    }

    pub fn count_documents(&self, collection: &str) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
