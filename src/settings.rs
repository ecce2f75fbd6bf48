//! Server-provided project settings: integration configuration and the tracking plan.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::JsonMap;

/// Integration key of the built-in remote collector. Always present in effective settings and
/// never overridable by compiled-in defaults.
pub const COLLECTOR_INTEGRATION_KEY: &str = "Beacon";

/// Immutable snapshot of the remote project configuration.
///
/// Deserialization is permissive: unknown fields are ignored and missing sections default to
/// empty, so a partial or newer server response never fails the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    /// Raw configuration objects keyed by integration name.
    #[serde(default)]
    pub integrations: HashMap<String, JsonMap>,
    /// Server-controlled rules enabling/disabling events globally or per-integration.
    #[serde(default)]
    pub plan: TrackingPlan,
    /// When this snapshot was fetched by the SDK. Absent on compiled-in defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingPlan {
    /// Per-event-name rules for track calls. A missing entry means "allowed everywhere".
    #[serde(default)]
    pub track: HashMap<String, EventPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPlan {
    /// `false` disables the event for every integration, authoritatively: per-call options
    /// cannot restore it.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-integration exceptions. Only an explicit boolean here participates in override
    /// resolution; absent keys are always allowed.
    #[serde(default)]
    pub integrations: HashMap<String, bool>,
}

fn default_enabled() -> bool {
    true
}

impl Default for EventPlan {
    fn default() -> EventPlan {
        EventPlan {
            enabled: true,
            integrations: HashMap::new(),
        }
    }
}

impl ProjectSettings {
    /// Effective settings when no server snapshot is available: compiled-in `defaults` plus the
    /// always-present collector entry carrying the write key.
    ///
    /// Defaults may *extend* the collector entry with additional fields, but the built-in
    /// `apiKey` survives the merge.
    pub fn with_defaults(defaults: &ProjectSettings, write_key: &str) -> ProjectSettings {
        let mut settings = defaults.clone();
        let collector = settings
            .integrations
            .entry(COLLECTOR_INTEGRATION_KEY.to_owned())
            .or_default();
        collector.insert("apiKey".to_owned(), Value::String(write_key.to_owned()));
        settings
    }

    /// The tracking-plan entry for a track event, if any.
    pub fn track_plan(&self, event: &str) -> Option<&EventPlan> {
        self.plan.track.get(event)
    }

    pub fn has_integration(&self, key: &str) -> bool {
        self.integrations.contains_key(key)
    }
}
