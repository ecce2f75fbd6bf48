//! The pluggable sink interface.

use crate::lifecycle::LifecycleEvent;
use crate::payload::{JsonMap, Payload};

/// A sink that receives filtered payloads.
///
/// All methods default to no-ops; an adapter implements the subset its downstream library
/// supports. Calls for a given payload are serialized by the registry, so implementations need
/// `Send` but not `Sync` and get `&mut self`.
pub trait Integration: Send {
    fn identify(&mut self, payload: &Payload) {
        let _ = payload;
    }

    fn group(&mut self, payload: &Payload) {
        let _ = payload;
    }

    fn track(&mut self, payload: &Payload) {
        let _ = payload;
    }

    fn alias(&mut self, payload: &Payload) {
        let _ = payload;
    }

    fn screen(&mut self, payload: &Payload) {
        let _ = payload;
    }

    fn flush(&mut self) {}

    fn reset(&mut self) {}

    /// Raw host lifecycle events, forwarded to every integration regardless of routing.
    fn lifecycle(&mut self, event: &LifecycleEvent) {
        let _ = event;
    }
}

/// Creates an [`Integration`] the first time its key appears in a settings snapshot.
pub trait IntegrationFactory: Send + Sync {
    /// The integration key this factory can build.
    fn key(&self) -> &str;

    /// Attempt to build the integration from its raw settings. Returning `None` means this
    /// factory cannot adapt the given settings; the key is skipped and not retried.
    fn create(&self, settings: &JsonMap) -> Option<Box<dyn Integration>>;
}
