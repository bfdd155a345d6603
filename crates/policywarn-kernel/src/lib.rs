//! `policywarn-kernel` – policy warning decisions.
//!
//! Watches which privileged background services are bound for the active
//! user, defers a warning for non-compliant ones by a grace period, and
//! remembers which warnings the user already resolved so they are not
//! repeated across restarts and user switches.
//!
//! # Modules
//!
//! - [`controller`] – [`PolicyWarningController`][controller::PolicyWarningController]:
//!   the single serialized entry point for host lifecycle events, alarm
//!   wakes and user actions.
//! - [`session`] – [`UserSessionTable`][session::UserSessionTable]: per-user
//!   in-memory tracking state, owned by the controller.
//! - [`codec`] – encodes the resolved-service set to the persisted string.
//! - [`collaborators`] – the [`AlarmScheduler`], [`NotificationSink`],
//!   [`SettingsStore`] and [`Navigator`] capability traits.
//! - [`config`] – [`WarningConfig`]: grace period and notification keys.
//! - `testing` – recording fakes of every collaborator (`testing` feature).

pub mod codec;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use collaborators::{AlarmScheduler, Navigator, NotificationSink, SettingsStore};
pub use config::WarningConfig;
pub use controller::{Collaborators, PolicyWarningController};
pub use session::{SessionSnapshot, UserSession, UserSessionTable};
