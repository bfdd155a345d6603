//! `policywarn-types` – shared vocabulary for the policy warning stack.
//!
//! Principals ([`UserId`]), bindable services ([`ServiceId`]), the action
//! messages routed into the controller ([`PolicyAction`]), scheduler request
//! tokens ([`AlarmRequest`]) and the global [`PolicyError`].
//!
//! The [`capture`] module holds the plain transport value handed across the
//! host process boundary together with an optional live connection.

pub mod capture;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Integer principal identifier. All controller state is partitioned by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable key for a bindable background service: owning package plus the
/// implementing class.
///
/// The short string form is `package/class`, with the class abbreviated to
/// `.Suffix` when it lives inside the package namespace:
///
/// ```
/// use policywarn_types::ServiceId;
///
/// let id = ServiceId::new("com.example.reader", "com.example.reader.ReaderService").unwrap();
/// assert_eq!(id.to_short_string(), "com.example.reader/.ReaderService");
/// assert_eq!(ServiceId::parse("com.example.reader/.ReaderService"), Some(id));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceId {
    package: String,
    class: String,
}

impl ServiceId {
    /// Build an identifier, rejecting empty parts, a `/` inside the package
    /// name and a class with a leading `.` (the short form could not be
    /// parsed back).
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Result<Self, PolicyError> {
        let package = package.into();
        let class = class.into();
        if package.is_empty() || class.is_empty() || package.contains('/') || class.starts_with('.')
        {
            return Err(PolicyError::InvalidServiceId(format!("{package}/{class}")));
        }
        Ok(Self { package, class })
    }

    /// Parse the short string form. Returns `None` for malformed input.
    pub fn parse(short: &str) -> Option<Self> {
        let (package, class) = short.split_once('/')?;
        if package.is_empty() || class.is_empty() {
            return None;
        }
        let class = if let Some(suffix) = class.strip_prefix('.') {
            if suffix.is_empty() {
                return None;
            }
            format!("{package}.{suffix}")
        } else {
            class.to_string()
        };
        Some(Self {
            package: package.to_string(),
            class,
        })
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Flatten to `package/class`, abbreviating in-package classes.
    pub fn to_short_string(&self) -> String {
        match self
            .class
            .strip_prefix(self.package.as_str())
            .filter(|rest| rest.len() > 1 && rest.starts_with('.'))
        {
            Some(rest) => format!("{}/{}", self.package, rest),
            None => format!("{}/{}", self.package, self.class),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_short_string())
    }
}

impl FromStr for ServiceId {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| PolicyError::InvalidServiceId(s.to_string()))
    }
}

impl TryFrom<String> for ServiceId {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServiceId> for String {
    fn from(id: ServiceId) -> Self {
        id.to_short_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Action messages
// ─────────────────────────────────────────────────────────────────────────────

/// The named actions the host delivers back to the controller as
/// asynchronous messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// A grace-period alarm fired; show the warning if still relevant.
    SendNotification,
    /// The user tapped the warning to review the service in settings.
    OpenSettings,
    /// The user swiped the warning away.
    DismissNotification,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [
        ActionKind::SendNotification,
        ActionKind::OpenSettings,
        ActionKind::DismissNotification,
    ];

    /// Stable identifier used on the host's message transport.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SendNotification => "policywarn.action.SEND_NOTIFICATION",
            ActionKind::OpenSettings => "policywarn.action.OPEN_SETTINGS",
            ActionKind::DismissNotification => "policywarn.action.DISMISS_NOTIFICATION",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PolicyError::UnknownAction(s.to_string()))
    }
}

/// The `(user, service)` pair every action message carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionTarget {
    pub user_id: UserId,
    pub service: ServiceId,
}

/// A typed action message routed into the controller's serialized queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "target")]
pub enum PolicyAction {
    SendNotification(ActionTarget),
    OpenSettings(ActionTarget),
    DismissNotification(ActionTarget),
}

impl PolicyAction {
    pub fn new(kind: ActionKind, user_id: UserId, service: ServiceId) -> Self {
        let target = ActionTarget { user_id, service };
        match kind {
            ActionKind::SendNotification => PolicyAction::SendNotification(target),
            ActionKind::OpenSettings => PolicyAction::OpenSettings(target),
            ActionKind::DismissNotification => PolicyAction::DismissNotification(target),
        }
    }

    /// Rebuild an action from the raw pieces a host transport delivers.
    pub fn from_parts(action: &str, user_id: UserId, service: &str) -> Result<Self, PolicyError> {
        let kind: ActionKind = action.parse()?;
        let service: ServiceId = service.parse()?;
        Ok(Self::new(kind, user_id, service))
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            PolicyAction::SendNotification(_) => ActionKind::SendNotification,
            PolicyAction::OpenSettings(_) => ActionKind::OpenSettings,
            PolicyAction::DismissNotification(_) => ActionKind::DismissNotification,
        }
    }

    pub fn target(&self) -> &ActionTarget {
        match self {
            PolicyAction::SendNotification(t)
            | PolicyAction::OpenSettings(t)
            | PolicyAction::DismissNotification(t) => t,
        }
    }
}

/// Identity of one controller-issued one-shot alarm.
///
/// Two requests are the same alarm exactly when action, user and service
/// all match, so scheduling replaces and cancelling is by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlarmRequest {
    pub action: ActionKind,
    pub user_id: UserId,
    pub service: ServiceId,
}

impl AlarmRequest {
    pub fn new(action: ActionKind, user_id: UserId, service: ServiceId) -> Self {
        Self {
            action,
            user_id,
            service,
        }
    }

    /// The message delivered to the controller when this alarm fires.
    pub fn to_action(&self) -> PolicyAction {
        PolicyAction::new(self.action, self.user_id, self.service.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Host-facing payloads
// ─────────────────────────────────────────────────────────────────────────────

/// One privileged service currently bound for a user, as reported by the
/// host together with the compliance oracle's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledService {
    pub service: ServiceId,
    /// Human-readable display label.
    pub label: String,
    /// `true` when the service declares the required capability category.
    pub compliant: bool,
}

/// A warning ready to be rendered by the notification sink.
///
/// The sink keys it by `(service, code)`; re-issuing the same key replaces
/// the visible warning rather than stacking a second one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningNotification {
    pub user_id: UserId,
    pub service: ServiceId,
    pub code: u32,
    pub title: String,
    pub text: String,
    /// Delivered when the user taps the warning.
    pub content_action: PolicyAction,
    /// Delivered when the user dismisses the warning.
    pub delete_action: PolicyAction,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors surfaced by collaborators and host-boundary parsing.
///
/// None of these are fatal: the controller logs them and carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Invalid service identifier: {0}")]
    InvalidServiceId(String),

    #[error("Unknown action identifier: {0}")]
    UnknownAction(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Collaborator {collaborator} unavailable: {details}")]
    CollaboratorUnavailable {
        collaborator: String,
        details: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Controller queue closed")]
    QueueClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> ServiceId {
        ServiceId::new("com.example.reader", "com.example.reader.ReaderService").unwrap()
    }

    #[test]
    fn short_string_abbreviates_in_package_class() {
        assert_eq!(reader().to_short_string(), "com.example.reader/.ReaderService");
    }

    #[test]
    fn short_string_keeps_foreign_class() {
        let id = ServiceId::new("com.example.reader", "org.other.Helper").unwrap();
        assert_eq!(id.to_short_string(), "com.example.reader/org.other.Helper");
        assert_eq!(ServiceId::parse(&id.to_short_string()), Some(id));
    }

    #[test]
    fn class_sharing_prefix_without_dot_is_not_abbreviated() {
        let id = ServiceId::new("com.example", "com.exampleX.Svc").unwrap();
        assert_eq!(id.to_short_string(), "com.example/com.exampleX.Svc");
    }

    #[test]
    fn parse_expands_leading_dot() {
        let id = ServiceId::parse("com.example.reader/.ReaderService").unwrap();
        assert_eq!(id, reader());
        assert_eq!(id.class(), "com.example.reader.ReaderService");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(ServiceId::parse("").is_none());
        assert!(ServiceId::parse("no-slash").is_none());
        assert!(ServiceId::parse("/.Cls").is_none());
        assert!(ServiceId::parse("pkg/").is_none());
        assert!(ServiceId::parse("pkg/.").is_none());
    }

    #[test]
    fn new_rejects_slash_in_package() {
        assert!(matches!(
            ServiceId::new("a/b", "Cls"),
            Err(PolicyError::InvalidServiceId(_))
        ));
        assert!(ServiceId::new("", "Cls").is_err());
    }

    #[test]
    fn service_id_serializes_as_short_string() {
        let json = serde_json::to_string(&reader()).unwrap();
        assert_eq!(json, "\"com.example.reader/.ReaderService\"");
        let back: ServiceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reader());
    }

    #[test]
    fn action_kind_identifiers_are_distinct_and_parse_back() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
        assert!(matches!(
            "policywarn.action.BOGUS".parse::<ActionKind>(),
            Err(PolicyError::UnknownAction(_))
        ));
    }

    #[test]
    fn policy_action_from_parts() {
        let action = PolicyAction::from_parts(
            "policywarn.action.OPEN_SETTINGS",
            UserId(10),
            "com.example.reader/.ReaderService",
        )
        .unwrap();
        assert_eq!(action.kind(), ActionKind::OpenSettings);
        assert_eq!(action.target().user_id, UserId(10));
        assert_eq!(action.target().service, reader());
    }

    #[test]
    fn policy_action_json_is_tagged() {
        let action = PolicyAction::new(ActionKind::DismissNotification, UserId(0), reader());
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"action\":\"DismissNotification\""));
        let back: PolicyAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn alarm_request_identity_is_full_tuple() {
        let a = AlarmRequest::new(ActionKind::SendNotification, UserId(10), reader());
        let b = AlarmRequest::new(ActionKind::SendNotification, UserId(10), reader());
        let other_user = AlarmRequest::new(ActionKind::SendNotification, UserId(11), reader());
        assert_eq!(a, b);
        assert_ne!(a, other_user);
        assert_eq!(
            a.to_action(),
            PolicyAction::new(ActionKind::SendNotification, UserId(10), reader())
        );
    }

    #[test]
    fn policy_error_display() {
        let err = PolicyError::CollaboratorUnavailable {
            collaborator: "notifications".to_string(),
            details: "connection dead".to_string(),
        };
        assert!(err.to_string().contains("notifications"));
    }
}
