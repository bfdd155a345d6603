//! [`PolicyWarningController`] – decides when a bound privileged service
//! earns a user-facing policy warning.
//!
//! Per `(user, service)` pair the controller walks this state machine:
//!
//! ```text
//! UNTRACKED ──bind, compliant──────────▶ ENABLED_COMPLIANT
//!     │
//!     └──bind, non-compliant──▶ PENDING ──wake──▶ WARNED ──user acts──▶ RESOLVED
//!
//! unbind from any state ──▶ UNTRACKED   (RESOLVED membership is cleared too)
//! ```
//!
//! Every entry point takes the single controller lock, so host lifecycle
//! callbacks, alarm wakes and user actions never interleave on a session.
//! Collaborator calls are fire-and-forget: failures are logged and the
//! in-memory state stays authoritative.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use policywarn_types::{
    ActionKind, AlarmRequest, EnabledService, PolicyAction, PolicyError, ServiceId, UserId,
    WarningNotification,
};
use tracing::{debug, info, instrument, warn};

use crate::codec;
use crate::collaborators::{AlarmScheduler, Navigator, NotificationSink, SettingsStore};
use crate::config::WarningConfig;
use crate::session::{SessionSnapshot, UserSession, UserSessionTable};

const WARNING_TITLE: &str = "Review a service with full control of your device";

/// The four collaborators the controller drives.
#[derive(Clone)]
pub struct Collaborators {
    pub alarms: Arc<dyn AlarmScheduler>,
    pub notifications: Arc<dyn NotificationSink>,
    pub settings: Arc<dyn SettingsStore>,
    pub navigator: Arc<dyn Navigator>,
}

/// Per-user warning controller. See the [module docs](self).
pub struct PolicyWarningController {
    config: WarningConfig,
    collaborators: Collaborators,
    sessions: Mutex<UserSessionTable>,
}

impl PolicyWarningController {
    pub fn new(config: WarningConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            sessions: Mutex::new(UserSessionTable::new()),
        }
    }

    pub fn config(&self) -> &WarningConfig {
        &self.config
    }

    /// Copy of the session state for `user_id`, if the user is active.
    pub fn snapshot(&self, user_id: UserId) -> Option<SessionSnapshot> {
        self.sessions().get(user_id).map(UserSession::snapshot)
    }

    // ── Host lifecycle ────────────────────────────────────────────────────

    /// Make `user_id` the active user.
    ///
    /// Every other session is dropped and its pending alarms cancelled.
    /// The user's own session is rebuilt from persisted state, so calling
    /// this twice in a row is idempotent. Warnings already on screen are
    /// left alone.
    #[instrument(level = "debug", skip(self))]
    pub fn on_user_activated(&self, user_id: UserId) {
        let mut sessions = self.sessions();
        for stale in sessions.drain() {
            for service in stale.pending_alarms().keys() {
                self.cancel_alarm(stale.user_id(), service);
            }
            debug!(user = %stale.user_id(), "dropped user session");
        }

        let notified = match self.collaborators.settings.read(user_id) {
            Ok(raw) => codec::decode(&raw),
            Err(e) => {
                warn!(user = %user_id, error = %e, "failed to load resolved services; starting empty");
                BTreeSet::new()
            }
        };
        info!(user = %user_id, resolved = notified.len(), "user session activated");
        sessions.insert(UserSession::new(user_id, notified));
    }

    /// Apply a fresh host snapshot of the services bound for `user_id`.
    ///
    /// Newly disabled services are forgotten (alarm and warning cancelled,
    /// resolution cleared and persisted). Newly enabled services the
    /// compliance oracle rejects get a grace alarm unless already resolved.
    #[instrument(level = "debug", skip(self, enabled))]
    pub fn on_enabled_services_changed(&self, user_id: UserId, enabled: &BTreeSet<ServiceId>) {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(user_id) else {
            debug!(user = %user_id, "enabled services changed for inactive user; ignored");
            return;
        };

        let (added, removed) = session.diff_enabled(enabled);
        let mut resolution_changed = false;
        for service in &removed {
            resolution_changed |= self.disable(session, service);
        }
        session.set_enabled(enabled);

        if !added.is_empty() {
            let verdicts = self.host_services(user_id);
            for service in &added {
                match verdicts.get(service) {
                    Some(info) if !info.compliant => self.schedule_warning(session, service),
                    Some(_) => debug!(user = %user_id, service = %service, "service is compliant"),
                    None => debug!(
                        user = %user_id,
                        service = %service,
                        "host did not report service; no warning scheduled"
                    ),
                }
            }
        }

        if resolution_changed {
            self.persist(session);
        }
    }

    /// A service the caller already knows to be non-compliant was bound.
    #[instrument(level = "debug", skip(self))]
    pub fn on_noncompliant_service_bound(&self, user_id: UserId, service: &ServiceId) {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(user_id) else {
            debug!(user = %user_id, "bind for inactive user; ignored");
            return;
        };
        session.mark_enabled(service);
        self.schedule_warning(session, service);
    }

    /// A non-compliant service was unbound.
    #[instrument(level = "debug", skip(self))]
    pub fn on_noncompliant_service_unbound(&self, user_id: UserId, service: &ServiceId) {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(user_id) else {
            debug!(user = %user_id, "unbind for inactive user; ignored");
            return;
        };
        if self.disable(session, service) {
            self.persist(session);
        }
    }

    // ── Asynchronous actions ──────────────────────────────────────────────

    /// Route a delivered action message to its handler.
    pub fn handle_action(&self, action: &PolicyAction) {
        let target = action.target();
        match action.kind() {
            ActionKind::SendNotification => {
                self.handle_scheduled_wake(target.user_id, &target.service)
            }
            ActionKind::OpenSettings => {
                self.handle_user_opens_settings(target.user_id, &target.service)
            }
            ActionKind::DismissNotification => {
                self.handle_user_dismisses(target.user_id, &target.service)
            }
        }
    }

    /// The grace alarm for `(user_id, service)` fired.
    ///
    /// Stale wakes (service gone, already resolved or already on screen,
    /// now compliant, or user inactive) are dropped silently.
    #[instrument(level = "debug", skip(self))]
    pub fn handle_scheduled_wake(&self, user_id: UserId, service: &ServiceId) {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(user_id) else {
            debug!(user = %user_id, service = %service, "wake for inactive user dropped");
            return;
        };
        let was_pending = session.take_pending(service);
        if !session.is_enabled(service) || session.is_notified(service) || session.is_shown(service)
        {
            debug!(user = %user_id, service = %service, was_pending, "stale wake dropped");
            return;
        }

        let label = match self.collaborators.notifications.list_enabled_services(user_id) {
            Ok(listed) => match listed.into_iter().find(|s| &s.service == service) {
                Some(info) if info.compliant => {
                    debug!(user = %user_id, service = %service, "service became compliant; wake dropped");
                    return;
                }
                Some(info) => info.label,
                None => service.to_short_string(),
            },
            Err(e) => {
                warn!(user = %user_id, error = %e, "could not list bound services; using identifier as label");
                service.to_short_string()
            }
        };

        let notification = self.build_warning(user_id, service, &label);
        match self.collaborators.notifications.show(&notification) {
            Ok(()) => {
                session.mark_shown(service);
                info!(user = %user_id, service = %service, "policy warning shown");
            }
            Err(e) => warn!(user = %user_id, service = %service, error = %e, "failed to show policy warning"),
        }
    }

    /// The user tapped the warning: open the service's settings page and
    /// record the resolution. Dropped if the service is no longer bound,
    /// pending or on screen.
    #[instrument(level = "debug", skip(self))]
    pub fn handle_user_opens_settings(&self, user_id: UserId, service: &ServiceId) {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(user_id) else {
            debug!(user = %user_id, service = %service, "settings action for inactive user dropped");
            return;
        };
        if !session.is_tracked(service) {
            debug!(user = %user_id, service = %service, "settings action for untracked service dropped");
            return;
        }
        self.clear_visible_warning(session, service);
        soft(
            self.collaborators.notifications.collapse_ambient_surfaces(),
            "collapse_ambient_surfaces",
            user_id,
            service,
        );
        soft(
            self.collaborators.navigator.open_service_detail(user_id, service),
            "open_service_detail",
            user_id,
            service,
        );
        session.resolve(service);
        info!(user = %user_id, service = %service, "warning resolved via settings");
        self.persist(session);
    }

    /// The user dismissed the warning: record the resolution only. Same
    /// staleness rule as [`Self::handle_user_opens_settings`].
    #[instrument(level = "debug", skip(self))]
    pub fn handle_user_dismisses(&self, user_id: UserId, service: &ServiceId) {
        let mut sessions = self.sessions();
        let Some(session) = sessions.get_mut(user_id) else {
            debug!(user = %user_id, service = %service, "dismiss for inactive user dropped");
            return;
        };
        if !session.is_tracked(service) {
            debug!(user = %user_id, service = %service, "dismiss for untracked service dropped");
            return;
        }
        self.clear_visible_warning(session, service);
        session.resolve(service);
        info!(user = %user_id, service = %service, "warning dismissed");
        self.persist(session);
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn sessions(&self) -> MutexGuard<'_, UserSessionTable> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_warning(&self, session: &mut UserSession, service: &ServiceId) {
        let user_id = session.user_id();
        if session.has_warning_state(service) {
            debug!(user = %user_id, service = %service, "warning already tracked; bind ignored");
            return;
        }
        let fire_at = self.deadline();
        let request = AlarmRequest::new(ActionKind::SendNotification, user_id, service.clone());
        match self.collaborators.alarms.schedule(request, fire_at) {
            Ok(()) => {
                session.set_pending(service, fire_at);
                info!(user = %user_id, service = %service, %fire_at, "policy warning scheduled");
            }
            Err(e) => warn!(user = %user_id, service = %service, error = %e, "failed to schedule warning alarm"),
        }
    }

    /// Cancel everything outstanding for `service` and forget it. Returns
    /// `true` when the persisted resolution set changed.
    fn disable(&self, session: &mut UserSession, service: &ServiceId) -> bool {
        let user_id = session.user_id();
        self.cancel_alarm(user_id, service);
        self.cancel_warning(user_id, service);
        let was_resolved = session.forget(service);
        debug!(user = %user_id, service = %service, was_resolved, "service disabled");
        was_resolved
    }

    fn clear_visible_warning(&self, session: &mut UserSession, service: &ServiceId) {
        let user_id = session.user_id();
        if session.take_pending(service) {
            self.cancel_alarm(user_id, service);
        }
        self.cancel_warning(user_id, service);
    }

    fn cancel_alarm(&self, user_id: UserId, service: &ServiceId) {
        let request = AlarmRequest::new(ActionKind::SendNotification, user_id, service.clone());
        soft(self.collaborators.alarms.cancel(&request), "cancel_alarm", user_id, service);
    }

    fn cancel_warning(&self, user_id: UserId, service: &ServiceId) {
        soft(
            self.collaborators
                .notifications
                .cancel(user_id, service, self.config.notification_code),
            "cancel_warning",
            user_id,
            service,
        );
    }

    fn persist(&self, session: &UserSession) {
        let value = codec::encode(session.notified());
        if let Err(e) = self.collaborators.settings.write(session.user_id(), &value) {
            warn!(user = %session.user_id(), error = %e, "failed to persist resolved services");
        }
    }

    fn host_services(&self, user_id: UserId) -> HashMap<ServiceId, EnabledService> {
        match self.collaborators.notifications.list_enabled_services(user_id) {
            Ok(listed) => listed.into_iter().map(|s| (s.service.clone(), s)).collect(),
            Err(e) => {
                warn!(user = %user_id, error = %e, "could not query compliance; no warnings scheduled");
                HashMap::new()
            }
        }
    }

    fn deadline(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.config.grace_period())
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn build_warning(&self, user_id: UserId, service: &ServiceId, label: &str) -> WarningNotification {
        WarningNotification {
            user_id,
            service: service.clone(),
            code: self.config.notification_code,
            title: WARNING_TITLE.to_string(),
            text: format!(
                "{label} can view your screen and act on your behalf. Review its access in settings."
            ),
            content_action: PolicyAction::new(ActionKind::OpenSettings, user_id, service.clone()),
            delete_action: PolicyAction::new(
                ActionKind::DismissNotification,
                user_id,
                service.clone(),
            ),
        }
    }
}

fn soft(result: Result<(), PolicyError>, op: &'static str, user_id: UserId, service: &ServiceId) {
    if let Err(e) = result {
        warn!(user = %user_id, service = %service, op, error = %e, "collaborator call failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SinkCall, TestCollaborators};
    use std::time::Duration;

    const USER: UserId = UserId(10);
    const OTHER_USER: UserId = UserId(20);

    fn reader() -> ServiceId {
        ServiceId::parse("com.example.reader/.ReaderService").unwrap()
    }

    fn wake_request(user_id: UserId) -> AlarmRequest {
        AlarmRequest::new(ActionKind::SendNotification, user_id, reader())
    }

    fn setup() -> (PolicyWarningController, TestCollaborators) {
        let fakes = TestCollaborators::default();
        let controller = PolicyWarningController::new(WarningConfig::default(), fakes.collaborators());
        controller.on_user_activated(USER);
        (controller, fakes)
    }

    fn report(fakes: &TestCollaborators, user_id: UserId, compliant: bool) {
        fakes.notifications.set_services(
            user_id,
            vec![EnabledService {
                service: reader(),
                label: "Screen Reader".to_string(),
                compliant,
            }],
        );
    }

    fn enable(controller: &PolicyWarningController, user_id: UserId) {
        controller.on_enabled_services_changed(user_id, &BTreeSet::from([reader()]));
    }

    fn disable_all(controller: &PolicyWarningController, user_id: UserId) {
        controller.on_enabled_services_changed(user_id, &BTreeSet::new());
    }

    // ── Scheduling ────────────────────────────────────────────────────────

    #[test]
    fn noncompliant_enable_schedules_exactly_one_alarm() {
        let (controller, fakes) = setup();
        report(&fakes, USER, false);
        let before = Utc::now();

        enable(&controller, USER);

        let scheduled = fakes.alarms.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, wake_request(USER));
        let grace = TimeDelta::from_std(controller.config().grace_period()).unwrap();
        assert!(scheduled[0].1 >= before + grace);
        assert!(controller.snapshot(USER).unwrap().pending.contains(&reader()));
    }

    #[test]
    fn compliant_enable_schedules_nothing() {
        let (controller, fakes) = setup();
        report(&fakes, USER, true);
        enable(&controller, USER);
        assert!(fakes.alarms.scheduled().is_empty());
        assert!(controller.snapshot(USER).unwrap().enabled.contains(&reader()));
    }

    #[test]
    fn unreported_service_schedules_nothing() {
        let (controller, fakes) = setup();
        enable(&controller, USER);
        assert!(fakes.alarms.scheduled().is_empty());
    }

    #[test]
    fn resolved_service_is_not_rescheduled() {
        let fakes = TestCollaborators::default();
        fakes.settings.seed(USER, "com.example.reader/.ReaderService");
        let controller = PolicyWarningController::new(WarningConfig::default(), fakes.collaborators());
        controller.on_user_activated(USER);
        report(&fakes, USER, false);

        enable(&controller, USER);
        controller.on_noncompliant_service_bound(USER, &reader());

        assert!(fakes.alarms.scheduled().is_empty());
    }

    #[test]
    fn duplicate_bind_reports_are_idempotent() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_bound(USER, &reader());
        controller.on_noncompliant_service_bound(USER, &reader());
        report(&fakes, USER, false);
        enable(&controller, USER);

        assert_eq!(fakes.alarms.scheduled().len(), 1);
    }

    #[test]
    fn disable_before_wake_cancels_alarm_and_never_shows() {
        let (controller, fakes) = setup();
        report(&fakes, USER, false);
        enable(&controller, USER);

        disable_all(&controller, USER);
        // The alarm raced the cancel and was delivered anyway.
        controller.handle_scheduled_wake(USER, &reader());

        assert!(fakes.alarms.cancelled().contains(&wake_request(USER)));
        assert!(fakes.notifications.shown().is_empty());
        let snap = controller.snapshot(USER).unwrap();
        assert!(snap.pending.is_empty());
        assert!(snap.enabled.is_empty());
    }

    #[test]
    fn unbind_cancels_alarm_by_identity_even_when_untracked() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_unbound(USER, &reader());
        assert_eq!(fakes.alarms.cancelled(), vec![wake_request(USER)]);
    }

    #[test]
    fn bound_then_unbound_clears_pending() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_bound(USER, &reader());
        assert_eq!(fakes.alarms.scheduled()[0].0, wake_request(USER));

        controller.on_noncompliant_service_unbound(USER, &reader());
        let snap = controller.snapshot(USER).unwrap();
        assert!(snap.pending.is_empty());
        assert!(!snap.enabled.contains(&reader()));
        // Nothing was resolved, so nothing is persisted.
        assert!(fakes.settings.writes().is_empty());
    }

    // ── User activation ───────────────────────────────────────────────────

    #[test]
    fn user_activated_twice_is_idempotent() {
        let fakes = TestCollaborators::default();
        fakes.settings.seed(USER, "com.a/.Svc,com.b/.Svc");
        let controller = PolicyWarningController::new(WarningConfig::default(), fakes.collaborators());

        controller.on_user_activated(USER);
        let first = controller.snapshot(USER).unwrap();
        controller.on_user_activated(USER);
        let second = controller.snapshot(USER).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.notified.len(), 2);
        assert!(second.enabled.is_empty());
        assert!(second.pending.is_empty());
    }

    #[test]
    fn switching_users_drops_session_and_cancels_its_alarms() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_bound(USER, &reader());

        controller.on_user_activated(OTHER_USER);

        assert!(controller.snapshot(USER).is_none());
        assert!(fakes.alarms.cancelled().contains(&wake_request(USER)));
        // A wake for the departed user is a no-op.
        controller.handle_scheduled_wake(USER, &reader());
        assert!(fakes.notifications.shown().is_empty());
    }

    #[test]
    fn state_is_partitioned_by_user() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_bound(USER, &reader());
        controller.handle_user_dismisses(USER, &reader());
        controller.on_user_activated(OTHER_USER);

        assert!(controller.snapshot(OTHER_USER).unwrap().notified.is_empty());
        assert_eq!(fakes.settings.value(OTHER_USER), None);
        assert_eq!(
            fakes.settings.value(USER).as_deref(),
            Some("com.example.reader/.ReaderService")
        );
    }

    #[test]
    fn calls_for_unknown_user_are_noops() {
        let fakes = TestCollaborators::default();
        let controller = PolicyWarningController::new(WarningConfig::default(), fakes.collaborators());

        controller.on_noncompliant_service_bound(USER, &reader());
        controller.on_noncompliant_service_unbound(USER, &reader());
        enable(&controller, USER);
        controller.handle_scheduled_wake(USER, &reader());
        controller.handle_user_opens_settings(USER, &reader());
        controller.handle_user_dismisses(USER, &reader());

        assert!(fakes.alarms.scheduled().is_empty());
        assert!(fakes.alarms.cancelled().is_empty());
        assert!(fakes.notifications.calls().is_empty());
        assert!(fakes.settings.writes().is_empty());
        assert!(fakes.navigator.opened().is_empty());
    }

    // ── Scenarios ─────────────────────────────────────────────────────────

    #[test]
    fn wake_shows_warning_once_without_persisting() {
        let (controller, fakes) = setup();
        report(&fakes, USER, false);
        enable(&controller, USER);

        controller.handle_scheduled_wake(USER, &reader());

        let shown = fakes.notifications.shown();
        assert_eq!(shown.len(), 1);
        let warning = &shown[0];
        assert_eq!(warning.user_id, USER);
        assert_eq!(warning.service, reader());
        assert_eq!(warning.code, controller.config().notification_code);
        assert!(warning.text.contains("Screen Reader"));
        assert_eq!(
            warning.content_action,
            PolicyAction::new(ActionKind::OpenSettings, USER, reader())
        );
        assert_eq!(
            warning.delete_action,
            PolicyAction::new(ActionKind::DismissNotification, USER, reader())
        );
        assert_eq!(fakes.settings.value(USER), None);

        let snap = controller.snapshot(USER).unwrap();
        assert!(snap.shown.contains(&reader()));
        assert!(snap.pending.is_empty());
    }

    #[test]
    fn open_settings_navigates_collapses_cancels_and_persists() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_bound(USER, &reader());
        controller.handle_scheduled_wake(USER, &reader());

        controller.handle_user_opens_settings(USER, &reader());

        assert_eq!(fakes.navigator.opened(), vec![(USER, reader())]);
        assert_eq!(fakes.notifications.collapses(), 1);
        assert!(fakes.notifications.cancelled().contains(&(USER, reader())));
        assert_eq!(
            fakes.settings.value(USER).as_deref(),
            Some("com.example.reader/.ReaderService")
        );
    }

    #[test]
    fn dismiss_persists_without_navigation() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_bound(USER, &reader());
        controller.handle_scheduled_wake(USER, &reader());

        controller.handle_user_dismisses(USER, &reader());

        assert_eq!(
            fakes.settings.value(USER).as_deref(),
            Some("com.example.reader/.ReaderService")
        );
        assert!(fakes.navigator.opened().is_empty());
        assert_eq!(fakes.notifications.collapses(), 0);
    }

    #[test]
    fn disable_then_reenable_produces_fresh_warning() {
        let (controller, fakes) = setup();
        report(&fakes, USER, false);
        enable(&controller, USER);
        controller.handle_scheduled_wake(USER, &reader());
        controller.handle_user_dismisses(USER, &reader());

        disable_all(&controller, USER);
        assert_eq!(fakes.settings.value(USER).as_deref(), Some(""));
        assert!(controller.snapshot(USER).unwrap().notified.is_empty());

        enable(&controller, USER);
        assert_eq!(fakes.alarms.scheduled().len(), 2);
        controller.handle_scheduled_wake(USER, &reader());
        assert_eq!(fakes.notifications.shown().len(), 2);
    }

    #[test]
    fn switching_away_and_back_keeps_unresolved_warning() {
        let (controller, fakes) = setup();
        report(&fakes, USER, false);
        enable(&controller, USER);
        controller.handle_scheduled_wake(USER, &reader());
        let persisted_before = fakes.settings.value(USER).unwrap_or_default();

        controller.on_user_activated(OTHER_USER);
        controller.on_user_activated(USER);

        assert_eq!(fakes.notifications.shown().len(), 1);
        assert!(
            !fakes.notifications.calls().iter().any(|c| matches!(c, SinkCall::Cancel { .. })),
            "warning must not be cancelled by a user switch"
        );
        let snap = controller.snapshot(USER).unwrap();
        assert_eq!(snap.notified, codec::decode(&persisted_before));

        // The still-visible warning can be resolved once the host has
        // re-reported the bound services for the returning user.
        enable(&controller, USER);
        controller.handle_user_dismisses(USER, &reader());
        assert_eq!(
            fakes.settings.value(USER).as_deref(),
            Some("com.example.reader/.ReaderService")
        );
    }

    // ── Stale and duplicate deliveries ────────────────────────────────────

    #[test]
    fn wake_dropped_when_host_now_reports_compliant() {
        let (controller, fakes) = setup();
        report(&fakes, USER, false);
        enable(&controller, USER);
        report(&fakes, USER, true);

        controller.handle_scheduled_wake(USER, &reader());

        assert!(fakes.notifications.shown().is_empty());
    }

    #[test]
    fn duplicate_wake_while_shown_is_noop() {
        let (controller, fakes) = setup();
        report(&fakes, USER, false);
        enable(&controller, USER);
        controller.handle_scheduled_wake(USER, &reader());
        controller.handle_scheduled_wake(USER, &reader());
        assert_eq!(fakes.notifications.shown().len(), 1);
    }

    #[test]
    fn wake_after_resolution_is_dropped() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_bound(USER, &reader());
        controller.handle_user_dismisses(USER, &reader());
        controller.handle_scheduled_wake(USER, &reader());
        assert!(fakes.notifications.shown().is_empty());
    }

    #[test]
    fn resolution_while_pending_cancels_alarm() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_bound(USER, &reader());

        controller.handle_user_dismisses(USER, &reader());

        assert!(fakes.alarms.cancelled().contains(&wake_request(USER)));
        let snap = controller.snapshot(USER).unwrap();
        assert!(snap.pending.is_empty());
        assert!(snap.notified.contains(&reader()));
    }

    #[test]
    fn unlisted_service_uses_identifier_as_label() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_bound(USER, &reader());
        controller.handle_scheduled_wake(USER, &reader());
        let shown = fakes.notifications.shown();
        assert!(shown[0].text.contains("com.example.reader/.ReaderService"));
    }

    #[test]
    fn handle_action_routes_by_kind() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_bound(USER, &reader());
        controller.handle_action(&PolicyAction::new(ActionKind::OpenSettings, USER, reader()));
        assert_eq!(fakes.navigator.opened().len(), 1);

        controller.on_noncompliant_service_bound(USER, &ServiceId::parse("com.x/.Other").unwrap());
        controller.handle_action(&PolicyAction::new(
            ActionKind::SendNotification,
            USER,
            ServiceId::parse("com.x/.Other").unwrap(),
        ));
        assert_eq!(fakes.notifications.shown().len(), 1);
    }

    #[test]
    fn resolution_after_unbind_is_dropped_and_rebind_warns_again() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_bound(USER, &reader());
        controller.handle_scheduled_wake(USER, &reader());
        controller.on_noncompliant_service_unbound(USER, &reader());

        // The dismiss was in flight when the service went away.
        controller.handle_user_dismisses(USER, &reader());
        controller.handle_user_opens_settings(USER, &reader());

        assert!(fakes.settings.value(USER).is_none());
        assert!(fakes.navigator.opened().is_empty());
        assert!(controller.snapshot(USER).unwrap().notified.is_empty());

        controller.on_noncompliant_service_bound(USER, &reader());
        assert_eq!(fakes.alarms.scheduled().len(), 2);
    }

    #[test]
    fn resolution_for_never_bound_service_is_dropped() {
        let (controller, fakes) = setup();
        controller.handle_user_dismisses(USER, &reader());
        controller.handle_user_opens_settings(USER, &reader());
        assert!(fakes.settings.writes().is_empty());
        assert!(fakes.notifications.calls().is_empty());
    }

    // ── Failure handling ──────────────────────────────────────────────────

    #[test]
    fn persistence_failure_keeps_memory_authoritative() {
        let (controller, fakes) = setup();
        let other = ServiceId::parse("com.x/.Other").unwrap();
        controller.on_noncompliant_service_bound(USER, &reader());
        controller.on_noncompliant_service_bound(USER, &other);
        fakes.settings.set_failing(true);

        controller.handle_user_dismisses(USER, &reader());
        assert!(controller.snapshot(USER).unwrap().notified.contains(&reader()));
        assert_eq!(fakes.settings.value(USER), None);

        fakes.settings.set_failing(false);
        controller.handle_user_dismisses(USER, &other);
        assert_eq!(
            fakes.settings.value(USER).as_deref(),
            Some("com.example.reader/.ReaderService,com.x/.Other")
        );
    }

    #[test]
    fn settings_read_failure_starts_empty() {
        let fakes = TestCollaborators::default();
        fakes.settings.seed(USER, "com.a/.Svc");
        fakes.settings.set_failing(true);
        let controller = PolicyWarningController::new(WarningConfig::default(), fakes.collaborators());

        controller.on_user_activated(USER);

        assert!(controller.snapshot(USER).unwrap().notified.is_empty());
    }

    #[test]
    fn failed_show_does_not_mark_shown() {
        let (controller, fakes) = setup();
        controller.on_noncompliant_service_bound(USER, &reader());
        fakes.notifications.set_failing(true);

        controller.handle_scheduled_wake(USER, &reader());

        let snap = controller.snapshot(USER).unwrap();
        assert!(snap.shown.is_empty());
        assert!(snap.pending.is_empty());
    }

    #[test]
    fn failed_schedule_leaves_service_retryable() {
        let (controller, fakes) = setup();
        fakes.alarms.set_failing(true);
        controller.on_noncompliant_service_bound(USER, &reader());
        assert!(controller.snapshot(USER).unwrap().pending.is_empty());

        fakes.alarms.set_failing(false);
        controller.on_noncompliant_service_bound(USER, &reader());
        assert_eq!(fakes.alarms.scheduled().len(), 1);
    }

    #[test]
    fn compliance_query_failure_schedules_nothing() {
        let (controller, fakes) = setup();
        report(&fakes, USER, false);
        fakes.notifications.set_failing(true);
        enable(&controller, USER);
        assert!(fakes.alarms.scheduled().is_empty());
        assert!(controller.snapshot(USER).unwrap().enabled.contains(&reader()));
    }

    #[test]
    fn custom_grace_period_is_used() {
        let fakes = TestCollaborators::default();
        let config = WarningConfig {
            grace_period_secs: 5,
            ..WarningConfig::default()
        };
        let controller = PolicyWarningController::new(config, fakes.collaborators());
        controller.on_user_activated(USER);
        let before = Utc::now();

        controller.on_noncompliant_service_bound(USER, &reader());

        let fire_at = fakes.alarms.scheduled()[0].1;
        assert!(fire_at >= before + TimeDelta::seconds(5));
        assert!(fire_at <= Utc::now() + TimeDelta::seconds(5));
    }

    // ── Serialization ─────────────────────────────────────────────────────

    #[test]
    fn concurrent_callers_are_serialized() {
        let (controller, fakes) = setup();
        let controller = Arc::new(controller);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let controller = controller.clone();
                std::thread::spawn(move || {
                    let service = ServiceId::parse(&format!("com.t{i}/.Svc")).unwrap();
                    for _ in 0..50 {
                        controller.on_noncompliant_service_bound(USER, &service);
                        controller.handle_scheduled_wake(USER, &service);
                        controller.on_noncompliant_service_unbound(USER, &service);
                        std::thread::sleep(Duration::from_micros(10));
                    }
                    controller.on_noncompliant_service_bound(USER, &service);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = controller.snapshot(USER).unwrap();
        assert_eq!(snap.enabled.len(), 8);
        assert_eq!(snap.pending.len(), 8);
        assert!(snap.shown.is_empty());
        assert_eq!(fakes.notifications.shown().len(), 8 * 50);
    }
}
