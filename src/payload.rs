//! Immutable, typed event records.
//!
//! A [`Payload`] is created synchronously on the calling thread inside the public
//! track/identify/... call, enriched exactly once at construction (context merge, per-call
//! additions), and never mutated afterwards. Routing decisions produce per-integration booleans,
//! never altered payload copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::traits::Traits;

/// Free-form JSON object attached to payloads (event properties, context sections, raw
/// integration settings).
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Event properties reported with track/screen calls.
pub type Properties = JsonMap;

/// The kind of user action a payload records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    Identify,
    Track,
    Screen,
    Group,
    Alias,
}

/// Resolution of generated payload timestamps.
///
/// Millisecond precision is the wire default; nanosecond precision can be enabled for hosts that
/// need sub-millisecond event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampPrecision {
    #[default]
    Millis,
    Nanos,
}

pub(crate) fn format_timestamp(timestamp: DateTime<Utc>, precision: TimestampPrecision) -> String {
    let format = match precision {
        TimestampPrecision::Millis => "%Y-%m-%dT%H:%M:%S%.3fZ",
        TimestampPrecision::Nanos => "%Y-%m-%dT%H:%M:%S%.9fZ",
    };
    timestamp.format(format).to_string()
}

/// One immutable telemetry event record.
///
/// Serializes to the flattened wire shape: the type-specific [`Body`] fields appear at the top
/// level next to the common fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(rename = "type")]
    pub kind: PayloadType,
    /// Unique per payload, generated at creation.
    pub message_id: String,
    /// ISO-8601, millisecond or nanosecond precision per client configuration.
    pub timestamp: String,
    pub anonymous_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// The metadata envelope assembled by the context builder, plus per-call additions.
    pub context: JsonMap,
    #[serde(flatten)]
    pub body: Body,
}

/// Type-specific payload fields.
///
/// Untagged: the adjacent `type` field on [`Payload`] names the variant on the wire. Variant
/// order matters for deserialization — variants with required fields come first, `Screen` (all
/// fields optional) last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Body {
    Track {
        event: String,
        #[serde(default)]
        properties: Properties,
    },
    Group {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(default)]
        traits: Traits,
    },
    Alias {
        #[serde(rename = "previousId")]
        previous_id: String,
    },
    Identify {
        traits: Traits,
    },
    Screen {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        #[serde(default)]
        properties: Properties,
    },
}

impl Payload {
    /// Assemble a payload from its parts. `timestamp` is taken as a parameter so callers control
    /// the clock; `message_id` is always freshly generated.
    pub(crate) fn new(
        kind: PayloadType,
        body: Body,
        anonymous_id: String,
        user_id: Option<String>,
        context: JsonMap,
        timestamp: DateTime<Utc>,
        precision: TimestampPrecision,
    ) -> Payload {
        Payload {
            kind,
            message_id: uuid::Uuid::new_v4().to_string(),
            timestamp: format_timestamp(timestamp, precision),
            anonymous_id,
            user_id,
            context,
            body,
        }
    }

    /// Event name for track payloads, `None` for every other kind.
    pub fn event(&self) -> Option<&str> {
        match &self.body {
            Body::Track { event, .. } => Some(event),
            _ => None,
        }
    }
}
