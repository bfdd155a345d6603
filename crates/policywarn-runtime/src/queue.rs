//! [`ControllerQueue`] – the single serialization point in front of the
//! controller.
//!
//! Host lifecycle callbacks, alarm wakes and user actions arrive from
//! independent sources. Each is turned into a [`ControllerEvent`] and pushed
//! onto one unbounded tokio channel; a single task drains it and applies the
//! events to the [`PolicyWarningController`] strictly in arrival order.
//!
//! # Example
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use std::sync::Arc;
//! use policywarn_kernel::testing::TestCollaborators;
//! use policywarn_kernel::{PolicyWarningController, WarningConfig};
//! use policywarn_runtime::ControllerQueue;
//! use policywarn_types::UserId;
//!
//! let fakes = TestCollaborators::default();
//! let controller = Arc::new(PolicyWarningController::new(
//!     WarningConfig::default(),
//!     fakes.collaborators(),
//! ));
//!
//! let queue = ControllerQueue::new();
//! let handle = queue.handle();
//! let task = queue.spawn(controller.clone());
//!
//! handle.user_activated(UserId(10)).unwrap();
//! handle.flush().await.unwrap();
//! assert!(controller.snapshot(UserId(10)).is_some());
//!
//! handle.shutdown().unwrap();
//! task.await.unwrap();
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use policywarn_kernel::PolicyWarningController;
use policywarn_types::{PolicyAction, PolicyError, ServiceId, UserId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Everything that may touch controller state.
#[derive(Debug)]
pub enum ControllerEvent {
    UserActivated(UserId),
    EnabledServicesChanged {
        user_id: UserId,
        enabled: BTreeSet<ServiceId>,
    },
    ServiceBound {
        user_id: UserId,
        service: ServiceId,
    },
    ServiceUnbound {
        user_id: UserId,
        service: ServiceId,
    },
    Action(PolicyAction),
    /// Barrier: acknowledged once every earlier event has been applied.
    Flush(oneshot::Sender<()>),
    /// Stop draining; events queued after this are discarded.
    Shutdown,
}

/// Cloneable producer side of the queue.
#[derive(Clone, Debug)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl ControllerHandle {
    pub fn send(&self, event: ControllerEvent) -> Result<(), PolicyError> {
        self.tx.send(event).map_err(|_| PolicyError::QueueClosed)
    }

    pub fn user_activated(&self, user_id: UserId) -> Result<(), PolicyError> {
        self.send(ControllerEvent::UserActivated(user_id))
    }

    /// Queue a snapshot of the bound services. The set is copied; later
    /// changes by the caller are not observed.
    pub fn enabled_services_changed(
        &self,
        user_id: UserId,
        enabled: &BTreeSet<ServiceId>,
    ) -> Result<(), PolicyError> {
        self.send(ControllerEvent::EnabledServicesChanged {
            user_id,
            enabled: enabled.clone(),
        })
    }

    pub fn service_bound(&self, user_id: UserId, service: ServiceId) -> Result<(), PolicyError> {
        self.send(ControllerEvent::ServiceBound { user_id, service })
    }

    pub fn service_unbound(&self, user_id: UserId, service: ServiceId) -> Result<(), PolicyError> {
        self.send(ControllerEvent::ServiceUnbound { user_id, service })
    }

    /// Deliver an asynchronous action message (wake or user action).
    pub fn deliver(&self, action: PolicyAction) -> Result<(), PolicyError> {
        self.send(ControllerEvent::Action(action))
    }

    /// Wait until every event queued before this call has been applied.
    pub async fn flush(&self) -> Result<(), PolicyError> {
        let (ack, done) = oneshot::channel();
        self.send(ControllerEvent::Flush(ack))?;
        done.await.map_err(|_| PolicyError::QueueClosed)
    }

    pub fn shutdown(&self) -> Result<(), PolicyError> {
        self.send(ControllerEvent::Shutdown)
    }

    /// A handle that does not keep the queue open.
    pub fn downgrade(&self) -> WeakControllerHandle {
        WeakControllerHandle {
            tx: self.tx.downgrade(),
        }
    }
}

/// Non-owning producer. Held by components the controller itself owns, so
/// they do not keep the drain task alive.
#[derive(Clone, Debug)]
pub struct WeakControllerHandle {
    tx: mpsc::WeakUnboundedSender<ControllerEvent>,
}

impl WeakControllerHandle {
    /// `None` once every strong handle is gone.
    pub fn upgrade(&self) -> Option<ControllerHandle> {
        self.tx.upgrade().map(|tx| ControllerHandle { tx })
    }
}

/// Consumer side of the queue.
pub struct ControllerQueue {
    tx: mpsc::UnboundedSender<ControllerEvent>,
    rx: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl ControllerQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            tx: self.tx.clone(),
        }
    }

    /// Pull the next raw event without applying it.
    pub async fn next_event(&mut self) -> Option<ControllerEvent> {
        self.rx.recv().await
    }

    /// Drain the queue into `controller` on a dedicated task.
    pub fn spawn(self, controller: Arc<PolicyWarningController>) -> JoinHandle<()> {
        tokio::spawn(self.run(controller))
    }

    /// Apply events until [`ControllerEvent::Shutdown`] or until every
    /// strong [`ControllerHandle`] is dropped.
    pub async fn run(self, controller: Arc<PolicyWarningController>) {
        let Self { tx, mut rx } = self;
        // Only external handles keep the channel open.
        drop(tx);
        while let Some(event) = rx.recv().await {
            if !apply(&controller, event) {
                break;
            }
        }
        info!("controller queue stopped");
    }
}

impl Default for ControllerQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply one event. Returns `false` when the queue should stop.
fn apply(controller: &PolicyWarningController, event: ControllerEvent) -> bool {
    match event {
        ControllerEvent::UserActivated(user_id) => controller.on_user_activated(user_id),
        ControllerEvent::EnabledServicesChanged { user_id, enabled } => {
            controller.on_enabled_services_changed(user_id, &enabled)
        }
        ControllerEvent::ServiceBound { user_id, service } => {
            controller.on_noncompliant_service_bound(user_id, &service)
        }
        ControllerEvent::ServiceUnbound { user_id, service } => {
            controller.on_noncompliant_service_unbound(user_id, &service)
        }
        ControllerEvent::Action(action) => controller.handle_action(&action),
        ControllerEvent::Flush(ack) => {
            // The waiter may have given up; nothing to do then.
            let _ = ack.send(());
        }
        ControllerEvent::Shutdown => {
            debug!("shutdown requested");
            return false;
        }
    }
    true
}
