//! A thread-safe in-memory storage for the currently active project settings. [`SettingsStore`]
//! provides concurrent access for readers (e.g., routing decisions) and writers (e.g., the
//! periodic settings poller).

use std::sync::{Arc, RwLock};

use crate::ProjectSettings;

/// `SettingsStore` provides a thread-safe (`Sync`) storage for project settings that allows
/// concurrent access for readers and writers.
///
/// `ProjectSettings` itself is always immutable and can only be replaced completely. Readers get
/// an `Arc` snapshot that is not affected by later replacements, so one event is routed against
/// one consistent snapshot.
pub struct SettingsStore {
    settings: RwLock<Arc<ProjectSettings>>,
}

impl SettingsStore {
    /// Create a store holding the given initial snapshot (cached settings or compiled-in
    /// defaults).
    pub fn new(initial: ProjectSettings) -> SettingsStore {
        SettingsStore {
            settings: RwLock::new(Arc::new(initial)),
        }
    }

    /// Get the currently-active settings snapshot.
    pub fn settings(&self) -> Arc<ProjectSettings> {
        // self.settings.read() should always return Ok(). Err() is possible only if the lock is
        // poisoned (writer panicked while holding the lock), which should never happen.
        self.settings
            .read()
            .expect("thread holding settings lock should not panic")
            .clone()
    }

    /// Replace the active snapshot.
    pub fn set_settings(&self, settings: Arc<ProjectSettings>) {
        let mut slot = self
            .settings
            .write()
            .expect("thread holding settings lock should not panic");

        *slot = settings;
    }
}
