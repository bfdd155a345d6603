//! [`CaptureResponse`] – the value handed back across the host process
//! boundary when a capture/connection handle is requested.
//!
//! It is a plain immutable record plus one optional live resource, the
//! [`CaptureConnection`]. The connection is released explicitly through
//! [`CaptureResponse::close`]; releasing twice is a no-op.
//!
//! # Example
//!
//! ```
//! use policywarn_types::capture::{CaptureResponse, Rect};
//!
//! let mut response = CaptureResponse::new("main window");
//! response.window_title = Some("Reader".into());
//! response.window_bounds = Some(Rect::new(0, 0, 1080, 2400));
//!
//! assert!(!response.is_connected());
//! response.close();
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::PolicyError;

/// Axis-aligned rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// A live handle attached to a [`CaptureResponse`].
pub trait CaptureConnection: Send {
    /// `true` while the remote end is still reachable.
    fn is_alive(&self) -> bool;

    /// Release the remote resource.
    fn close(&mut self) -> Result<(), PolicyError>;
}

/// Response value carrying capture metadata and an optional connection.
///
/// The metadata fields are plain public data; only the connection is
/// guarded, so that it can be released exactly once.
#[derive(Default)]
pub struct CaptureResponse {
    pub description: String,
    pub window_bounds: Option<Rect>,
    pub bounds_in_window: Option<Rect>,
    pub window_title: Option<String>,
    pub messages: Vec<String>,
    connection: Option<Box<dyn CaptureConnection>>,
}

impl CaptureResponse {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    /// Attach the live connection handed over with this response.
    pub fn with_connection(mut self, connection: Box<dyn CaptureConnection>) -> Self {
        self.connection = Some(connection);
        self
    }

    /// `true` when a connection is attached and its remote end is alive.
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_alive())
    }

    /// Release the attached connection, if any.
    ///
    /// A failure to close is logged; the handle is dropped either way.
    pub fn close(&mut self) {
        if let Some(mut connection) = self.connection.take()
            && let Err(e) = connection.close()
        {
            warn!(error = %e, "capture connection close failed");
        }
    }
}

impl fmt::Debug for CaptureResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureResponse")
            .field("description", &self.description)
            .field("window_bounds", &self.window_bounds)
            .field("bounds_in_window", &self.bounds_in_window)
            .field("window_title", &self.window_title)
            .field("messages", &self.messages)
            .field(
                "connection",
                if self.connection.is_some() { &"<attached>" } else { &"<none>" },
            )
            .finish()
    }
}
