//! Recording implementations of every collaborator.
//!
//! Each fake is cheap to clone; clones share the same log, so a test keeps
//! one handle for assertions and hands another to the controller. Every
//! fake can be switched into a failing mode to exercise the fail-soft paths.
//!
//! ```
//! use policywarn_kernel::testing::TestCollaborators;
//! use policywarn_kernel::{PolicyWarningController, WarningConfig};
//! use policywarn_types::UserId;
//!
//! let fakes = TestCollaborators::default();
//! let controller = PolicyWarningController::new(WarningConfig::default(), fakes.collaborators());
//! controller.on_user_activated(UserId(10));
//! assert!(fakes.alarms.scheduled().is_empty());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use policywarn_types::{
    AlarmRequest, EnabledService, PolicyError, ServiceId, UserId, WarningNotification,
};

use crate::collaborators::{AlarmScheduler, Navigator, NotificationSink, SettingsStore};
use crate::controller::Collaborators;

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unavailable(collaborator: &str) -> PolicyError {
    PolicyError::CollaboratorUnavailable {
        collaborator: collaborator.to_string(),
        details: "injected failure".to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Alarms
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingAlarms {
    scheduled: Arc<Mutex<Vec<(AlarmRequest, DateTime<Utc>)>>>,
    cancelled: Arc<Mutex<Vec<AlarmRequest>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingAlarms {
    pub fn scheduled(&self) -> Vec<(AlarmRequest, DateTime<Utc>)> {
        locked(&self.scheduled).clone()
    }

    pub fn cancelled(&self) -> Vec<AlarmRequest> {
        locked(&self.cancelled).clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl AlarmScheduler for RecordingAlarms {
    fn schedule(&self, request: AlarmRequest, fire_at: DateTime<Utc>) -> Result<(), PolicyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("alarms"));
        }
        locked(&self.scheduled).push((request, fire_at));
        Ok(())
    }

    fn cancel(&self, request: &AlarmRequest) -> Result<(), PolicyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable("alarms"));
        }
        locked(&self.cancelled).push(request.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────────────────

/// One call observed by [`RecordingNotifications`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Show(WarningNotification),
    Cancel {
        user_id: UserId,
        service: ServiceId,
        code: u32,
    },
    Collapse,
}

#[derive(Clone, Default)]
pub struct RecordingNotifications {
    calls: Arc<Mutex<Vec<SinkCall>>>,
    services: Arc<Mutex<HashMap<UserId, Vec<EnabledService>>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifications {
    /// Set what the host reports as bound for `user_id`.
    pub fn set_services(&self, user_id: UserId, services: Vec<EnabledService>) {
        locked(&self.services).insert(user_id, services);
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        locked(&self.calls).clone()
    }

    pub fn shown(&self) -> Vec<WarningNotification> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Show(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    pub fn cancelled(&self) -> Vec<(UserId, ServiceId)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Cancel {
                    user_id, service, ..
                } => Some((user_id, service)),
                _ => None,
            })
            .collect()
    }

    pub fn collapses(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SinkCall::Collapse))
            .count()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), PolicyError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(unavailable("notifications"))
        } else {
            Ok(())
        }
    }
}

impl NotificationSink for RecordingNotifications {
    fn show(&self, notification: &WarningNotification) -> Result<(), PolicyError> {
        self.check()?;
        locked(&self.calls).push(SinkCall::Show(notification.clone()));
        Ok(())
    }

    fn cancel(&self, user_id: UserId, service: &ServiceId, code: u32) -> Result<(), PolicyError> {
        self.check()?;
        locked(&self.calls).push(SinkCall::Cancel {
            user_id,
            service: service.clone(),
            code,
        });
        Ok(())
    }

    fn list_enabled_services(&self, user_id: UserId) -> Result<Vec<EnabledService>, PolicyError> {
        self.check()?;
        Ok(locked(&self.services)
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    fn collapse_ambient_surfaces(&self) -> Result<(), PolicyError> {
        self.check()?;
        locked(&self.calls).push(SinkCall::Collapse);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingSettings {
    values: Arc<Mutex<HashMap<UserId, String>>>,
    writes: Arc<Mutex<Vec<(UserId, String)>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingSettings {
    /// Stored value for `user_id`, `None` if never written.
    pub fn value(&self, user_id: UserId) -> Option<String> {
        locked(&self.values).get(&user_id).cloned()
    }

    /// Pre-populate storage without recording a write.
    pub fn seed(&self, user_id: UserId, value: &str) {
        locked(&self.values).insert(user_id, value.to_string());
    }

    pub fn writes(&self) -> Vec<(UserId, String)> {
        locked(&self.writes).clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl SettingsStore for RecordingSettings {
    fn read(&self, user_id: UserId) -> Result<String, PolicyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PolicyError::Persistence("injected read failure".into()));
        }
        Ok(self.value(user_id).unwrap_or_default())
    }

    fn write(&self, user_id: UserId, value: &str) -> Result<(), PolicyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PolicyError::Persistence("injected write failure".into()));
        }
        locked(&self.values).insert(user_id, value.to_string());
        locked(&self.writes).push((user_id, value.to_string()));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigator
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingNavigator {
    opened: Arc<Mutex<Vec<(UserId, ServiceId)>>>,
}

impl RecordingNavigator {
    pub fn opened(&self) -> Vec<(UserId, ServiceId)> {
        locked(&self.opened).clone()
    }
}

impl Navigator for RecordingNavigator {
    fn open_service_detail(&self, user_id: UserId, service: &ServiceId) -> Result<(), PolicyError> {
        locked(&self.opened).push((user_id, service.clone()));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bundle
// ─────────────────────────────────────────────────────────────────────────────

/// All four recording fakes together.
#[derive(Clone, Default)]
pub struct TestCollaborators {
    pub alarms: RecordingAlarms,
    pub notifications: RecordingNotifications,
    pub settings: RecordingSettings,
    pub navigator: RecordingNavigator,
}

impl TestCollaborators {
    /// Controller-facing handles sharing this bundle's logs.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            alarms: Arc::new(self.alarms.clone()),
            notifications: Arc::new(self.notifications.clone()),
            settings: Arc::new(self.settings.clone()),
            navigator: Arc::new(self.navigator.clone()),
        }
    }
}
