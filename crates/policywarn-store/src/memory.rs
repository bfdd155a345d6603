//! In-memory [`SettingsStore`] for ephemeral hosts.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use policywarn_kernel::SettingsStore;
use policywarn_types::{PolicyError, UserId};

/// Process-local settings; contents are lost on drop.
#[derive(Default)]
pub struct InMemorySettingsStore {
    values: Mutex<HashMap<UserId, String>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn read(&self, user_id: UserId) -> Result<String, PolicyError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(&user_id).cloned().unwrap_or_default())
    }

    fn write(&self, user_id: UserId, value: &str) -> Result<(), PolicyError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, value.to_string());
        Ok(())
    }
}
