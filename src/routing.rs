//! The per-event decision pipeline: which integrations receive a payload.
//!
//! Pure functions over a settings snapshot — no locks, no side effects. Precedence, strongest
//! first: global opt-out, then a plan-level global disable (authoritative, per-call options
//! cannot restore it), then plan per-integration booleans (an explicit per-call `true` restores
//! those), then per-call options with named keys beating the wildcard. Integrations absent from
//! the settings' `integrations` map are never selected.

use std::collections::HashSet;

use crate::options::Options;
use crate::payload::Payload;
use crate::settings::{EventPlan, ProjectSettings};

/// Compute the set of integration keys allowed to receive `payload`.
///
/// `candidates` is the set of constructed integrations plus the built-in collector key. With
/// `opted_out` set the result is empty; the call itself still counts as sent.
pub fn deliverable_integrations(
    payload: &Payload,
    settings: &ProjectSettings,
    options: &Options,
    opted_out: bool,
    candidates: &HashSet<String>,
) -> HashSet<String> {
    if opted_out {
        return HashSet::new();
    }

    // The tracking plan only ever filters track events.
    let plan = payload.event().and_then(|event| settings.track_plan(event));

    candidates
        .iter()
        .filter(|key| settings.has_integration(key))
        .filter(|key| enabled_for(key, plan, options))
        .cloned()
        .collect()
}

fn enabled_for(key: &str, plan: Option<&EventPlan>, options: &Options) -> bool {
    if let Some(plan) = plan {
        if !plan.enabled {
            // Authoritative: a globally disabled event cannot be re-enabled per call.
            return false;
        }
        if plan.integrations.get(key) == Some(&false) {
            // Only an explicit per-call `true` for this exact key restores it; the wildcard
            // does not count.
            return options.explicit(key) == Some(true);
        }
        // Explicit `true` in the plan or no entry at all: fall through to per-call options.
    }

    options.integration(key).unwrap_or(true)
}
