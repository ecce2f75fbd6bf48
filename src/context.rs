//! The metadata envelope attached to every outgoing payload.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::payload::JsonMap;
use crate::traits::Traits;

/// Information about the host application, reported in every payload's context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub build: String,
}

/// Information about the device the host application runs on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub manufacturer: String,
    pub model: String,
    pub name: String,
}

/// The live envelope merged into every outgoing payload's `context` field.
///
/// The static portion (library, app, device, os) is assembled once at construction. Traits are
/// the dynamic portion: identify mutates them, [`AnalyticsContext::reset`] replaces them with a
/// fresh anonymous identity while preserving the static fields. Mutation is guarded by a single
/// lock held by the owning client; this type itself is plain data.
#[derive(Debug, Clone)]
pub struct AnalyticsContext {
    fields: JsonMap,
    traits: Traits,
}

impl AnalyticsContext {
    pub fn new(app: AppInfo, device: DeviceInfo, traits: Traits) -> AnalyticsContext {
        let mut fields = JsonMap::new();
        fields.insert(
            "library".to_owned(),
            json!({
                "name": "beacon-rust",
                "version": env!("CARGO_PKG_VERSION"),
            }),
        );
        fields.insert(
            "app".to_owned(),
            serde_json::to_value(&app).expect("AppInfo serializes to a JSON object"),
        );
        fields.insert(
            "device".to_owned(),
            serde_json::to_value(&device).expect("DeviceInfo serializes to a JSON object"),
        );
        fields.insert("os".to_owned(), json!({ "name": std::env::consts::OS }));

        AnalyticsContext { fields, traits }
    }

    pub fn traits(&self) -> &Traits {
        &self.traits
    }

    pub fn traits_mut(&mut self) -> &mut Traits {
        &mut self.traits
    }

    pub fn set_traits(&mut self, traits: Traits) {
        self.traits = traits;
    }

    /// Replace traits with a freshly generated anonymous identity, preserving the static context
    /// fields. Returns the new traits for persisting.
    pub fn reset(&mut self) -> Traits {
        self.traits = Traits::anonymous();
        self.traits.clone()
    }

    /// Snapshot the envelope for one payload: static fields + current traits + per-call
    /// additions. Additions win on conflicting keys but never touch the live context.
    pub fn to_payload_context(&self, additions: &JsonMap) -> JsonMap {
        let mut context = self.fields.clone();
        context.insert(
            "traits".to_owned(),
            Value::Object(self.traits.as_map().clone()),
        );
        for (key, value) in additions {
            context.insert(key.clone(), value.clone());
        }
        context
    }
}
