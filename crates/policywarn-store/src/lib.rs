//! `policywarn-store` – persistence for resolved policy warnings.
//!
//! Implementations of the kernel's
//! [`SettingsStore`][policywarn_kernel::SettingsStore] contract.
//!
//! # Modules
//!
//! - [`sqlite`] – [`SqliteSettingsStore`]: durable per-user settings in a
//!   local SQLite database.
//! - [`memory`] – [`InMemorySettingsStore`]: process-local settings.

pub mod memory;
pub mod sqlite;

pub use memory::InMemorySettingsStore;
pub use sqlite::SqliteSettingsStore;

use policywarn_types::PolicyError;
use thiserror::Error;

/// Errors that can arise from settings storage.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Setting key must not be empty")]
    EmptyKey,
}

impl From<StoreError> for PolicyError {
    fn from(e: StoreError) -> Self {
        PolicyError::Persistence(e.to_string())
    }
}
