//! Per-call overrides of integration routing and extra context.

use std::collections::HashMap;

use serde_json::Value;

use crate::payload::JsonMap;

/// Wildcard key matching every integration in an [`Options`] override map. Named keys always win
/// over the wildcard.
pub const ALL_INTEGRATIONS_KEY: &str = "All";

/// Per-call overrides: enable/disable specific integrations (or all of them) for one event, and
/// attach extra context fields merged into that event's payload only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    integrations: HashMap<String, bool>,
    context: JsonMap,
}

impl Options {
    pub fn new() -> Options {
        Options::default()
    }

    /// Enable or disable an integration for this call. Use [`ALL_INTEGRATIONS_KEY`] to target
    /// every integration at once.
    pub fn set_integration(mut self, key: impl Into<String>, enabled: bool) -> Options {
        self.integrations.insert(key.into(), enabled);
        self
    }

    /// Attach an extra context field to this call's payload. The client's live context is not
    /// modified.
    pub fn put_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Options {
        self.context.insert(key.into(), value.into());
        self
    }

    /// The override for `key`: the named entry if present, the wildcard entry otherwise.
    pub fn integration(&self, key: &str) -> Option<bool> {
        self.integrations
            .get(key)
            .or_else(|| self.integrations.get(ALL_INTEGRATIONS_KEY))
            .copied()
    }

    /// The override explicitly named for `key`, ignoring the wildcard. Only an explicit `true`
    /// can restore an integration the tracking plan disabled per-integration.
    pub(crate) fn explicit(&self, key: &str) -> Option<bool> {
        self.integrations.get(key).copied()
    }

    pub fn context(&self) -> &JsonMap {
        &self.context
    }

    /// Layer `overrides` on top of `defaults`: both integration overrides and context additions
    /// from `overrides` win on conflict.
    pub(crate) fn merged(defaults: &Options, overrides: Option<&Options>) -> Options {
        let mut merged = defaults.clone();
        if let Some(overrides) = overrides {
            merged.integrations.extend(
                overrides
                    .integrations
                    .iter()
                    .map(|(key, enabled)| (key.clone(), *enabled)),
            );
            for (key, value) in &overrides.context {
                merged.context.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}
