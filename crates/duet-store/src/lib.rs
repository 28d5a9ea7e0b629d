//! # duet-store
//!
//! Document store adapter for the Duet sync engine.
//!
//! The engine talks to its backing database only through the
//! [`DocumentStore`] trait: JSON documents addressed by collection and id,
//! merge updates, an atomic array-append, and per-document push
//! subscriptions. Two backends ship here: [`MemoryStore`] for in-process use
//! and tests, and [`SqliteStore`], which persists documents through a
//! migrated `rusqlite` database.

pub mod database;
pub mod document;
pub mod hub;
pub mod memory;
pub mod migrations;
pub mod sqlite;

mod documents;
mod error;

pub use database::Database;
pub use document::{DocKey, DocumentStore};
pub use error::{Result, StoreError};
pub use hub::{DocumentSnapshot, Subscription, WatchHub};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
