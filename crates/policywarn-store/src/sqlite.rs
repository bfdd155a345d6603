//! SQLite-backed [`SettingsStore`].
//!
//! Persists one string per `(user, key)` so several settings can share a
//! database file. The controller only ever uses the key this store was
//! opened with.
//!
//! # Storage layout
//!
//! A single table `user_settings` is created (if it does not already exist):
//!
//! | column     | type    | description                          |
//! |------------|---------|--------------------------------------|
//! | user_id    | INTEGER | Principal the value belongs to       |
//! | key        | TEXT    | Setting name                         |
//! | value      | TEXT    | Raw setting string                   |
//! | updated_at | TEXT    | RFC-3339 last-write timestamp (UTC)  |
//!
//! `(user_id, key)` is the primary key; writes are upserts, so the last
//! write wins.
//!
//! # Example
//!
//! ```rust
//! use policywarn_kernel::SettingsStore;
//! use policywarn_store::SqliteSettingsStore;
//! use policywarn_types::UserId;
//!
//! let store = SqliteSettingsStore::open_in_memory("notified").unwrap();
//! assert_eq!(store.read(UserId(10)).unwrap(), "");
//!
//! store.write(UserId(10), "com.example/.Svc").unwrap();
//! assert_eq!(store.read(UserId(10)).unwrap(), "com.example/.Svc");
//! ```

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use policywarn_kernel::SettingsStore;
use policywarn_types::{PolicyError, UserId};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::StoreError;

pub struct SqliteSettingsStore {
    conn: Mutex<Connection>,
    key: String,
}

impl SqliteSettingsStore {
    /// Open (or create) a persistent store at `path` for setting `key`.
    pub fn open(path: impl AsRef<Path>, key: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, key)
    }

    /// Open a temporary in-memory store (useful for testing).
    pub fn open_in_memory(key: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, key)
    }

    fn with_connection(conn: Connection, key: &str) -> Result<Self, StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_settings (
                user_id    INTEGER NOT NULL,
                key        TEXT NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, key)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            key: key.to_string(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the stored value, `None` when nothing was ever written.
    pub fn get(&self, user_id: UserId) -> Result<Option<String>, StoreError> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM user_settings WHERE user_id = ?1 AND key = ?2",
                params![user_id.0, self.key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Upsert the value for `user_id`.
    pub fn put(&self, user_id: UserId, value: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO user_settings (user_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value,
                                                     updated_at = excluded.updated_at",
            params![user_id.0, self.key, value, now],
        )?;
        debug!(user = %user_id, key = %self.key, "setting written");
        Ok(())
    }

    /// Users with a stored value for this key, ascending.
    pub fn users(&self) -> Result<Vec<UserId>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT user_id FROM user_settings WHERE key = ?1 ORDER BY user_id ASC")?;
        let rows = stmt.query_map(params![self.key], |row| row.get::<_, i32>(0).map(UserId))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::Sqlite)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn read(&self, user_id: UserId) -> Result<String, PolicyError> {
        Ok(self.get(user_id)?.unwrap_or_default())
    }

    fn write(&self, user_id: UserId, value: &str) -> Result<(), PolicyError> {
        Ok(self.put(user_id, value)?)
    }
}
