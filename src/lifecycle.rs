//! Inbound host-lifecycle port.
//!
//! The core assumes nothing about the host's callback API; it only receives discrete lifecycle
//! events through [`crate::Analytics::handle_lifecycle_event`]. Host glue (activity observers,
//! window delegates, signal handlers) translates its own callbacks into these events.

use serde::{Deserialize, Serialize};

/// A discrete host application lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The application process was created. Carries the installed version so the SDK can detect
    /// installs and updates.
    ApplicationStarted { version: String, build: String },
    /// The application came to the foreground.
    ApplicationForegrounded,
    /// The application went to the background.
    ApplicationBackgrounded,
    /// A screen became visible.
    ScreenViewed { name: String },
}

/// Version bookkeeping persisted across restarts to tell installs from updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppVersion {
    pub version: String,
    pub build: String,
}
