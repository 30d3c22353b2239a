//! Persisted config store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Hold the process-wide, restart-durable key/value pointers used by the
//!   directory resolver.
//!
//! # Invariants
//! - `set` overwrites; there is at most one value per key.

use crate::db::Database;
use crate::model::module::Module;
use crate::model::session::SessionId;
use crate::repo::error::RepoResult;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;

/// Key holding the active academic session.
pub const ACTIVE_SESSION_KEY: &str = "active-session";

/// Config key of the container pointer for `(module, session)`.
pub fn container_id_key(module: Module, session: &SessionId) -> String {
    format!("container-id:{}:{}", module.as_str(), session)
}

/// Config key of the session folder pointer.
pub fn folder_id_key(session: &SessionId) -> String {
    format!("folder-id:{session}")
}

/// Durable key/value store for directory pointers.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> RepoResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> RepoResult<()>;
    /// Removes a key; returns whether it existed.
    fn remove(&self, key: &str) -> RepoResult<bool>;
}

/// SQLite-backed config store.
pub struct SqliteConfigStore {
    db: Arc<Database>,
}

impl SqliteConfigStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl ConfigStore for SqliteConfigStore {
    fn get(&self, key: &str) -> RepoResult<Option<String>> {
        let conn = self.db.lock();
        let value = conn
            .query_row(
                "SELECT value FROM config_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> RepoResult<()> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO config_entries (key, value)
             VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> RepoResult<bool> {
        let conn = self.db.lock();
        let changed = conn.execute("DELETE FROM config_entries WHERE key = ?1;", [key])?;
        Ok(changed > 0)
    }
}
