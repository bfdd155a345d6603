//! [`PolicyWarningRuntime`] – a running controller with its queue and timers.
//!
//! Wires a [`PolicyWarningController`] to a [`TokioAlarmScheduler`] and a
//! [`ControllerQueue`] drain task. Hosts supply the notification sink,
//! settings store and navigator; everything else is owned here.

use std::sync::Arc;

use policywarn_kernel::{
    Collaborators, Navigator, NotificationSink, PolicyWarningController, SettingsStore,
    WarningConfig,
};
use policywarn_types::PolicyError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::alarm::TokioAlarmScheduler;
use crate::queue::{ControllerHandle, ControllerQueue};

pub struct PolicyWarningRuntime {
    handle: ControllerHandle,
    controller: Arc<PolicyWarningController>,
    alarms: Arc<TokioAlarmScheduler>,
    drain: JoinHandle<()>,
}

impl PolicyWarningRuntime {
    /// Start the drain task on the current tokio runtime.
    pub fn start(
        config: WarningConfig,
        notifications: Arc<dyn NotificationSink>,
        settings: Arc<dyn SettingsStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, PolicyError> {
        let queue = ControllerQueue::new();
        let handle = queue.handle();
        let alarms = Arc::new(TokioAlarmScheduler::new(handle.clone())?);
        let controller = Arc::new(PolicyWarningController::new(
            config,
            Collaborators {
                alarms: alarms.clone(),
                notifications,
                settings,
                navigator,
            },
        ));
        let drain = queue.spawn(controller.clone());
        info!(
            grace_period_secs = controller.config().grace_period_secs,
            "policy warning runtime started"
        );
        Ok(Self {
            handle,
            controller,
            alarms,
            drain,
        })
    }

    /// Producer handle for host callbacks and user actions.
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    /// Direct read access for inspection; mutate only through the handle.
    pub fn controller(&self) -> &Arc<PolicyWarningController> {
        &self.controller
    }

    pub fn alarms(&self) -> &Arc<TokioAlarmScheduler> {
        &self.alarms
    }

    /// Apply everything queued so far, then stop the drain task.
    pub async fn shutdown(self) -> Result<(), PolicyError> {
        self.handle.flush().await?;
        self.handle.shutdown()?;
        if let Err(e) = self.drain.await {
            warn!(error = %e, "controller queue task failed");
        }
        Ok(())
    }
}
