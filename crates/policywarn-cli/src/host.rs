//! Terminal stand-ins for the host-side collaborators.
//!
//! [`ConsoleNotifications`] keeps a per-user catalog of bound services (fed
//! by `declare_service` script lines) and the set of warnings currently on
//! screen, printing every change. [`ConsoleNavigator`] prints navigation
//! requests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use colored::Colorize;
use policywarn_kernel::{Navigator, NotificationSink};
use policywarn_types::{EnabledService, PolicyError, ServiceId, UserId, WarningNotification};
use tracing::info;

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type NotificationKey = (UserId, ServiceId, u32);

#[derive(Default)]
pub struct ConsoleNotifications {
    catalog: Mutex<HashMap<UserId, BTreeMap<ServiceId, EnabledService>>>,
    visible: Mutex<BTreeMap<NotificationKey, WarningNotification>>,
    quiet: bool,
}

impl ConsoleNotifications {
    /// A sink that records without printing.
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::default()
        }
    }

    /// Add or replace a catalog entry for `user_id`.
    pub fn declare(&self, user_id: UserId, service: EnabledService) {
        locked(&self.catalog)
            .entry(user_id)
            .or_default()
            .insert(service.service.clone(), service);
    }

    /// Warnings currently on screen, ordered by key.
    pub fn visible(&self) -> Vec<WarningNotification> {
        locked(&self.visible).values().cloned().collect()
    }
}

impl NotificationSink for ConsoleNotifications {
    fn show(&self, notification: &WarningNotification) -> Result<(), PolicyError> {
        let key = (
            notification.user_id,
            notification.service.clone(),
            notification.code,
        );
        locked(&self.visible).insert(key, notification.clone());
        info!(user = %notification.user_id, service = %notification.service, "notification posted");
        if !self.quiet {
            println!(
                "  {} [user {}] {}: {}",
                "⚠".yellow().bold(),
                notification.user_id,
                notification.title.bold(),
                notification.text
            );
        }
        Ok(())
    }

    fn cancel(&self, user_id: UserId, service: &ServiceId, code: u32) -> Result<(), PolicyError> {
        let removed = locked(&self.visible)
            .remove(&(user_id, service.clone(), code))
            .is_some();
        if removed && !self.quiet {
            println!(
                "  {} [user {}] warning for {} removed",
                "✓".green(),
                user_id,
                service.to_short_string().dimmed()
            );
        }
        Ok(())
    }

    fn list_enabled_services(&self, user_id: UserId) -> Result<Vec<EnabledService>, PolicyError> {
        Ok(locked(&self.catalog)
            .get(&user_id)
            .map(|services| services.values().cloned().collect())
            .unwrap_or_default())
    }

    fn collapse_ambient_surfaces(&self) -> Result<(), PolicyError> {
        if !self.quiet {
            println!("  {} notification shade collapsed", "·".dimmed());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct ConsoleNavigator {
    opened: Mutex<Vec<(UserId, ServiceId)>>,
    quiet: bool,
}

impl ConsoleNavigator {
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> Vec<(UserId, ServiceId)> {
        locked(&self.opened).clone()
    }
}

impl Navigator for ConsoleNavigator {
    fn open_service_detail(&self, user_id: UserId, service: &ServiceId) -> Result<(), PolicyError> {
        locked(&self.opened).push((user_id, service.clone()));
        if !self.quiet {
            println!(
                "  {} [user {}] opening settings for {}",
                "→".cyan(),
                user_id,
                service.to_short_string().bold()
            );
        }
        Ok(())
    }
}
