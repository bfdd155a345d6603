//! Capability interfaces the controller drives.
//!
//! Every call is fire-and-forget from the controller's point of view: a
//! returned error is logged and never rolls back in-memory state.
//! Implementations must not call back into the controller synchronously;
//! wakes and user actions are delivered through the host's serialized queue.

use chrono::{DateTime, Utc};
use policywarn_types::{
    AlarmRequest, EnabledService, PolicyError, ServiceId, UserId, WarningNotification,
};

/// Schedules and cancels one-shot wakes.
///
/// Scheduling a request equal to one already pending replaces it.
/// Cancelling an unknown or already-fired request is a no-op.
pub trait AlarmScheduler: Send + Sync {
    fn schedule(&self, request: AlarmRequest, fire_at: DateTime<Utc>) -> Result<(), PolicyError>;

    fn cancel(&self, request: &AlarmRequest) -> Result<(), PolicyError>;
}

/// Renders warnings and reports which privileged services are bound.
pub trait NotificationSink: Send + Sync {
    /// Show (or replace) the warning keyed by `(service, code)`.
    fn show(&self, notification: &WarningNotification) -> Result<(), PolicyError>;

    /// Remove the warning keyed by `(service, code)` if visible.
    fn cancel(&self, user_id: UserId, service: &ServiceId, code: u32) -> Result<(), PolicyError>;

    /// Services currently bound for `user_id`, each with the compliance
    /// oracle's verdict and a display label.
    fn list_enabled_services(&self, user_id: UserId) -> Result<Vec<EnabledService>, PolicyError>;

    /// Collapse shade/panels so a newly opened surface is visible.
    fn collapse_ambient_surfaces(&self) -> Result<(), PolicyError>;
}

/// Per-user persistence of a single string.
///
/// Last write wins; a user with nothing stored reads as `""`.
pub trait SettingsStore: Send + Sync {
    fn read(&self, user_id: UserId) -> Result<String, PolicyError>;

    fn write(&self, user_id: UserId, value: &str) -> Result<(), PolicyError>;
}

/// Opens host settings surfaces.
pub trait Navigator: Send + Sync {
    /// Open the per-service detail page for `service` as `user_id`.
    fn open_service_detail(&self, user_id: UserId, service: &ServiceId) -> Result<(), PolicyError>;
}
