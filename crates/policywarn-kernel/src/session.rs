//! [`UserSessionTable`] – per-user tracking state owned by the controller.
//!
//! Pure in-memory bookkeeping with no I/O. The table is not lockable on its
//! own; the controller holds it behind its single lock.
//!
//! Each [`UserSession`] tracks, per service:
//!
//! | set | meaning | persisted |
//! |---|---|---|
//! | `enabled` | currently bound for the user | no |
//! | `pending_alarms` | waiting out the grace period | no |
//! | `shown` | warning currently displayed | no |
//! | `notified` | warning resolved by the user | yes |
//!
//! A service is never both pending and shown.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use policywarn_types::{ServiceId, UserId};

// ─────────────────────────────────────────────────────────────────────────────
// UserSession
// ─────────────────────────────────────────────────────────────────────────────

/// Tracking state for one active user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    user_id: UserId,
    enabled: BTreeSet<ServiceId>,
    notified: BTreeSet<ServiceId>,
    pending_alarms: BTreeMap<ServiceId, DateTime<Utc>>,
    shown: BTreeSet<ServiceId>,
}

impl UserSession {
    /// Fresh session seeded with the persisted resolution set.
    pub fn new(user_id: UserId, notified: BTreeSet<ServiceId>) -> Self {
        Self {
            user_id,
            enabled: BTreeSet::new(),
            notified,
            pending_alarms: BTreeMap::new(),
            shown: BTreeSet::new(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn enabled(&self) -> &BTreeSet<ServiceId> {
        &self.enabled
    }

    pub fn notified(&self) -> &BTreeSet<ServiceId> {
        &self.notified
    }

    pub fn pending_alarms(&self) -> &BTreeMap<ServiceId, DateTime<Utc>> {
        &self.pending_alarms
    }

    pub fn is_enabled(&self, service: &ServiceId) -> bool {
        self.enabled.contains(service)
    }

    pub fn is_notified(&self, service: &ServiceId) -> bool {
        self.notified.contains(service)
    }

    pub fn is_pending(&self, service: &ServiceId) -> bool {
        self.pending_alarms.contains_key(service)
    }

    pub fn is_shown(&self, service: &ServiceId) -> bool {
        self.shown.contains(service)
    }

    /// `true` while the service is bound or has a warning pending or on
    /// screen. Resolution actions for anything else are stale.
    pub fn is_tracked(&self, service: &ServiceId) -> bool {
        self.is_enabled(service) || self.is_pending(service) || self.is_shown(service)
    }

    /// `true` when the service already has a warning in flight, on screen,
    /// or resolved, so a new bind report must not schedule another.
    pub fn has_warning_state(&self, service: &ServiceId) -> bool {
        self.is_pending(service) || self.is_shown(service) || self.is_notified(service)
    }

    /// Split `next` against the current enabled set into
    /// `(newly_enabled, newly_disabled)`. Does not modify the session.
    pub fn diff_enabled(&self, next: &BTreeSet<ServiceId>) -> (Vec<ServiceId>, Vec<ServiceId>) {
        let added = next.difference(&self.enabled).cloned().collect();
        let removed = self.enabled.difference(next).cloned().collect();
        (added, removed)
    }

    /// Replace the enabled set with a copy of the host snapshot.
    pub fn set_enabled(&mut self, next: &BTreeSet<ServiceId>) {
        self.enabled = next.clone();
    }

    /// Mark one service as bound. Returns `true` if it was not already.
    pub fn mark_enabled(&mut self, service: &ServiceId) -> bool {
        self.enabled.insert(service.clone())
    }

    /// Record a scheduled grace alarm. Replaces any earlier deadline.
    pub fn set_pending(&mut self, service: &ServiceId, fire_at: DateTime<Utc>) {
        self.shown.remove(service);
        self.pending_alarms.insert(service.clone(), fire_at);
    }

    /// Forget a pending alarm (fired or cancelled). Returns `true` if one
    /// was tracked.
    pub fn take_pending(&mut self, service: &ServiceId) -> bool {
        self.pending_alarms.remove(service).is_some()
    }

    /// Record that the warning is now on screen.
    pub fn mark_shown(&mut self, service: &ServiceId) {
        self.pending_alarms.remove(service);
        self.shown.insert(service.clone());
    }

    /// Mark the warning as resolved by the user. Returns `true` when the
    /// resolution set changed and must be persisted.
    pub fn resolve(&mut self, service: &ServiceId) -> bool {
        self.pending_alarms.remove(service);
        self.shown.remove(service);
        self.notified.insert(service.clone())
    }

    /// Drop every trace of `service` (it was disabled or unbound). Returns
    /// `true` when the resolution set changed and must be persisted.
    pub fn forget(&mut self, service: &ServiceId) -> bool {
        self.enabled.remove(service);
        self.pending_alarms.remove(service);
        self.shown.remove(service);
        self.notified.remove(service)
    }

    /// Clone the current state for inspection.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user_id: self.user_id,
            enabled: self.enabled.clone(),
            notified: self.notified.clone(),
            pending: self.pending_alarms.keys().cloned().collect(),
            shown: self.shown.clone(),
        }
    }
}

/// Point-in-time copy of a [`UserSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user_id: UserId,
    pub enabled: BTreeSet<ServiceId>,
    pub notified: BTreeSet<ServiceId>,
    pub pending: BTreeSet<ServiceId>,
    pub shown: BTreeSet<ServiceId>,
}

// ─────────────────────────────────────────────────────────────────────────────
// UserSessionTable
// ─────────────────────────────────────────────────────────────────────────────

/// Table of live sessions keyed by [`UserId`].
///
/// Entries are created and destroyed explicitly on user activation; nothing
/// accumulates for users that are no longer active.
#[derive(Debug, Default)]
pub struct UserSessionTable {
    sessions: HashMap<UserId, UserSession>,
}

impl UserSessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: UserId) -> Option<&UserSession> {
        self.sessions.get(&user_id)
    }

    pub fn get_mut(&mut self, user_id: UserId) -> Option<&mut UserSession> {
        self.sessions.get_mut(&user_id)
    }

    /// Return the session for `user_id`, creating an empty one if absent.
    pub fn get_or_create(&mut self, user_id: UserId) -> &mut UserSession {
        self.sessions
            .entry(user_id)
            .or_insert_with(|| UserSession::new(user_id, BTreeSet::new()))
    }

    /// Insert `session`, returning the one it replaced.
    pub fn insert(&mut self, session: UserSession) -> Option<UserSession> {
        self.sessions.insert(session.user_id(), session)
    }

    pub fn remove(&mut self, user_id: UserId) -> Option<UserSession> {
        self.sessions.remove(&user_id)
    }

    /// Remove and return every session.
    pub fn drain(&mut self) -> Vec<UserSession> {
        self.sessions.drain().map(|(_, session)| session).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
