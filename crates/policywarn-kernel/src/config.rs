//! [`WarningConfig`] – tunables for the policy warning controller.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default grace period between detecting a non-compliant service and
/// surfacing the warning.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 24 * 60 * 60;

/// Default category code paired with the service id to key a warning.
pub const DEFAULT_NOTIFICATION_CODE: u32 = 1005;

/// Default name of the persisted resolution-set setting.
pub const DEFAULT_SETTINGS_KEY: &str = "notified_noncompliant_services";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningConfig {
    /// Seconds to wait after a non-compliant bind before warning.
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Category code used with the service id as the notification key.
    #[serde(default = "default_notification_code")]
    pub notification_code: u32,

    /// Setting name under which resolved services are persisted.
    #[serde(default = "default_settings_key")]
    pub settings_key: String,
}

fn default_grace_period_secs() -> u64 {
    DEFAULT_GRACE_PERIOD_SECS
}
fn default_notification_code() -> u32 {
    DEFAULT_NOTIFICATION_CODE
}
fn default_settings_key() -> String {
    DEFAULT_SETTINGS_KEY.to_string()
}

impl WarningConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for WarningConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            notification_code: default_notification_code(),
            settings_key: default_settings_key(),
        }
    }
}
