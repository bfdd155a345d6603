//! `policywarn-runtime` – async plumbing around the policy-warning controller.
//!
//! # Modules
//!
//! - [`queue`] – [`ControllerQueue`] and its cloneable [`ControllerHandle`]:
//!   the one tokio channel through which every host callback, alarm wake and
//!   user action reaches the controller, applied strictly in arrival order.
//! - [`alarm`] – [`TokioAlarmScheduler`]: one-shot grace alarms keyed by
//!   [`AlarmRequest`][policywarn_types::AlarmRequest] identity, delivered
//!   back through the queue.
//! - [`service`] – [`PolicyWarningRuntime`]: controller, queue and timers
//!   started together.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP span export.

pub mod alarm;
pub mod queue;
pub mod service;
pub mod telemetry;

pub use alarm::TokioAlarmScheduler;
pub use queue::{ControllerEvent, ControllerHandle, ControllerQueue};
pub use service::PolicyWarningRuntime;
