//! `policywarn replay` – drive the controller from a JSON-lines script.
//!
//! Each non-blank line that does not start with `#` is one event:
//!
//! ```text
//! {"event":"declare_service","user":10,"service":"com.example.reader/.ReaderService","label":"Reader"}
//! {"event":"user_activated","user":10}
//! {"event":"enabled_services","user":10,"services":["com.example.reader/.ReaderService"]}
//! {"event":"bound","user":10,"service":"com.example.reader/.ReaderService"}
//! {"event":"unbound","user":10,"service":"com.example.reader/.ReaderService"}
//! {"event":"sleep","secs":5}
//! {"event":"action","action":"policywarn.action.OPEN_SETTINGS","user":10,"service":"com.example.reader/.ReaderService"}
//! ```
//!
//! `declare_service` feeds the host's service listing; `compliant` defaults
//! to `false`. Everything else is routed through the controller queue.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use policywarn_kernel::{SettingsStore, WarningConfig};
use policywarn_runtime::PolicyWarningRuntime;
use policywarn_types::{EnabledService, PolicyAction, PolicyError, ServiceId, UserId, WarningNotification};
use serde::Deserialize;
use tracing::{debug, info};

use crate::host::{ConsoleNavigator, ConsoleNotifications};

/// One script line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    DeclareService {
        user: UserId,
        service: ServiceId,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        compliant: bool,
    },
    UserActivated {
        user: UserId,
    },
    EnabledServices {
        user: UserId,
        services: BTreeSet<ServiceId>,
    },
    Bound {
        user: UserId,
        service: ServiceId,
    },
    Unbound {
        user: UserId,
        service: ServiceId,
    },
    /// Raw transport form; checked when the script is parsed.
    Action {
        action: String,
        user: UserId,
        service: String,
    },
    Sleep {
        secs: u64,
    },
}

/// Parse a whole script, reporting the first bad line by number.
pub fn parse_script(text: &str) -> Result<Vec<ScriptEvent>, String> {
    let mut events = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: ScriptEvent =
            serde_json::from_str(line).map_err(|e| format!("line {}: {}", idx + 1, e))?;
        if let ScriptEvent::Action {
            action,
            user,
            service,
        } = &event
        {
            PolicyAction::from_parts(action, *user, service)
                .map_err(|e| format!("line {}: {}", idx + 1, e))?;
        }
        events.push(event);
    }
    Ok(events)
}

/// What was left on screen when the script finished.
#[derive(Debug)]
pub struct ReplayOutcome {
    pub applied: usize,
    pub interrupted: bool,
    pub visible: Vec<WarningNotification>,
    pub opened: Vec<(UserId, ServiceId)>,
}

/// Run `events` against a fresh runtime backed by `settings`.
///
/// `stop` is polled between events and during sleeps.
pub async fn replay(
    events: Vec<ScriptEvent>,
    config: WarningConfig,
    settings: Arc<dyn SettingsStore>,
    stop: &AtomicBool,
    quiet: bool,
) -> Result<ReplayOutcome, PolicyError> {
    let (notifications, navigator) = if quiet {
        (ConsoleNotifications::quiet(), ConsoleNavigator::quiet())
    } else {
        (ConsoleNotifications::default(), ConsoleNavigator::default())
    };
    let notifications = Arc::new(notifications);
    let navigator = Arc::new(navigator);
    let runtime =
        PolicyWarningRuntime::start(config, notifications.clone(), settings, navigator.clone())?;
    let handle = runtime.handle();

    let mut applied = 0;
    let mut interrupted = false;
    for event in events {
        if stop.load(Ordering::SeqCst) {
            interrupted = true;
            break;
        }
        debug!(?event, "replaying");
        match event {
            ScriptEvent::DeclareService {
                user,
                service,
                label,
                compliant,
            } => {
                // Earlier events must see the listing as it was.
                handle.flush().await?;
                let label = label.unwrap_or_else(|| service.to_short_string());
                notifications.declare(
                    user,
                    EnabledService {
                        service,
                        label,
                        compliant,
                    },
                );
            }
            ScriptEvent::UserActivated { user } => handle.user_activated(user)?,
            ScriptEvent::EnabledServices { user, services } => {
                handle.enabled_services_changed(user, &services)?
            }
            ScriptEvent::Bound { user, service } => handle.service_bound(user, service)?,
            ScriptEvent::Unbound { user, service } => handle.service_unbound(user, service)?,
            ScriptEvent::Action {
                action,
                user,
                service,
            } => handle.deliver(PolicyAction::from_parts(&action, user, &service)?)?,
            ScriptEvent::Sleep { secs } => {
                handle.flush().await?;
                if !sleep_unless_stopped(secs, stop).await {
                    interrupted = true;
                    break;
                }
            }
        }
        applied += 1;
    }

    runtime.shutdown().await?;
    info!(applied, interrupted, "replay finished");
    Ok(ReplayOutcome {
        applied,
        interrupted,
        visible: notifications.visible(),
        opened: navigator.opened(),
    })
}

/// Sleep one second at a time. Returns `false` if `stop` was raised.
async fn sleep_unless_stopped(secs: u64, stop: &AtomicBool) -> bool {
    for _ in 0..secs {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    true
}
