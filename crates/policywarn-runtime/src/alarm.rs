//! [`TokioAlarmScheduler`] – one-shot grace-period alarms on tokio timers.
//!
//! Every [`AlarmRequest`] owns at most one sleeping task. Scheduling the same
//! request again aborts the old task and replaces it; cancelling aborts it.
//! When a task wakes it posts `request.to_action()` to the controller queue,
//! so the wake is applied in order with every other event.
//!
//! The scheduler is owned by the controller, which the drain task owns, so it
//! only keeps a weak queue handle. Wakes that fire after the queue is gone
//! are discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use policywarn_kernel::AlarmScheduler;
use policywarn_types::{AlarmRequest, PolicyError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::queue::{ControllerHandle, WeakControllerHandle};

struct Timer {
    generation: u64,
    task: JoinHandle<()>,
}

type TimerTable = Arc<Mutex<HashMap<AlarmRequest, Timer>>>;

fn locked(timers: &Mutex<HashMap<AlarmRequest, Timer>>) -> MutexGuard<'_, HashMap<AlarmRequest, Timer>> {
    timers.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct TokioAlarmScheduler {
    runtime: Handle,
    queue: WeakControllerHandle,
    timers: TimerTable,
    next_generation: AtomicU64,
}

impl TokioAlarmScheduler {
    /// Bind to the tokio runtime the caller is running on.
    pub fn new(queue: ControllerHandle) -> Result<Self, PolicyError> {
        let runtime = Handle::try_current().map_err(|e| PolicyError::CollaboratorUnavailable {
            collaborator: "alarms".into(),
            details: e.to_string(),
        })?;
        Ok(Self::with_runtime(runtime, queue))
    }

    pub fn with_runtime(runtime: Handle, queue: ControllerHandle) -> Self {
        Self {
            runtime,
            queue: queue.downgrade(),
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Number of alarms armed and not yet fired or cancelled.
    pub fn pending(&self) -> usize {
        locked(&self.timers).len()
    }

    pub fn is_armed(&self, request: &AlarmRequest) -> bool {
        locked(&self.timers).contains_key(request)
    }
}

impl AlarmScheduler for TokioAlarmScheduler {
    fn schedule(&self, request: AlarmRequest, fire_at: DateTime<Utc>) -> Result<(), PolicyError> {
        // A deadline in the past fires immediately.
        let delay = (fire_at - Utc::now()).to_std().unwrap_or_default();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // Held across spawn + insert so a zero-delay task cannot look itself
        // up before its entry exists.
        let mut timers = locked(&self.timers);
        let task = {
            let timers = Arc::clone(&self.timers);
            let queue = self.queue.clone();
            let request = request.clone();
            self.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                {
                    let mut timers = locked(&timers);
                    if timers.get(&request).is_some_and(|t| t.generation == generation) {
                        timers.remove(&request);
                    }
                }
                debug!(user = %request.user_id, service = %request.service, "grace alarm fired");
                let Some(queue) = queue.upgrade() else {
                    debug!(user = %request.user_id, service = %request.service, "queue gone; wake discarded");
                    return;
                };
                if let Err(e) = queue.deliver(request.to_action()) {
                    warn!(user = %request.user_id, service = %request.service, error = %e, "alarm wake lost");
                }
            })
        };
        debug!(user = %request.user_id, service = %request.service, %fire_at, "grace alarm armed");
        if let Some(previous) = timers.insert(request, Timer { generation, task }) {
            previous.task.abort();
        }
        Ok(())
    }

    fn cancel(&self, request: &AlarmRequest) -> Result<(), PolicyError> {
        if let Some(timer) = locked(&self.timers).remove(request) {
            timer.task.abort();
            debug!(user = %request.user_id, service = %request.service, "grace alarm cancelled");
        }
        Ok(())
    }
}

impl Drop for TokioAlarmScheduler {
    fn drop(&mut self) {
        for (_, timer) in locked(&self.timers).drain() {
            timer.task.abort();
        }
    }
}
