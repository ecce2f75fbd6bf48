//! Holds constructed integrations and fans calls out to them.
//!
//! Integrations are constructed lazily, once, the first time their key appears in a settings
//! snapshot with configuration for them. Construction failure is logged and the key is absent
//! from fan-out thereafter; it never aborts startup. Fan-out for one payload runs serially under
//! the registry lock, so integrations are never invoked concurrently with each other.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::integration::{Integration, IntegrationFactory};
use crate::lifecycle::LifecycleEvent;
use crate::payload::{Payload, PayloadType};
use crate::settings::ProjectSettings;
use crate::{Error, Result};

/// Invoked with the integration once it is constructed, immediately if it already is.
pub type ReadyCallback = Box<dyn FnOnce(&mut dyn Integration) + Send>;

pub struct IntegrationRegistry {
    factories: Vec<Box<dyn IntegrationFactory>>,
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    integrations: HashMap<String, Box<dyn Integration>>,
    /// Keys we already handed to their factory. Factories are not retried.
    attempted: HashSet<String>,
    pending_ready: HashMap<String, Vec<ReadyCallback>>,
}

impl IntegrationRegistry {
    pub fn new(factories: Vec<Box<dyn IntegrationFactory>>) -> IntegrationRegistry {
        IntegrationRegistry {
            factories,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Construct integrations for keys newly appearing in `settings` and fire their pending
    /// ready callbacks.
    pub fn accept_settings(&self, settings: &ProjectSettings) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");

        for factory in &self.factories {
            let key = factory.key();
            if inner.attempted.contains(key) {
                continue;
            }
            let Some(integration_settings) = settings.integrations.get(key) else {
                continue;
            };
            inner.attempted.insert(key.to_owned());

            match factory.create(integration_settings) {
                Some(integration) => {
                    log::debug!(target: "beacon", "integration {key} ready");
                    inner.integrations.insert(key.to_owned(), integration);
                    if let Some(callbacks) = inner.pending_ready.remove(key) {
                        let integration = inner
                            .integrations
                            .get_mut(key)
                            .expect("integration inserted above");
                        for callback in callbacks {
                            callback(&mut **integration);
                        }
                    }
                }
                None => {
                    log::warn!(target: "beacon", "factory for {key} could not create integration, skipping");
                }
            }
        }
    }

    /// Keys of all constructed integrations.
    pub fn keys(&self) -> HashSet<String> {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .integrations
            .keys()
            .cloned()
            .collect()
    }

    /// Deliver `payload` to every integration in `selected`, calling the method matching the
    /// payload type.
    pub fn dispatch(&self, selected: &HashSet<String>, payload: &Payload) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");

        for (key, integration) in inner.integrations.iter_mut() {
            if !selected.contains(key) {
                continue;
            }
            match payload.kind {
                PayloadType::Identify => integration.identify(payload),
                PayloadType::Track => integration.track(payload),
                PayloadType::Screen => integration.screen(payload),
                PayloadType::Group => integration.group(payload),
                PayloadType::Alias => integration.alias(payload),
            }
        }
    }

    /// Fan a flush out to every constructed integration.
    pub fn flush_all(&self) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        for integration in inner.integrations.values_mut() {
            integration.flush();
        }
    }

    /// Fan a reset out to every constructed integration.
    pub fn reset_all(&self) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        for integration in inner.integrations.values_mut() {
            integration.reset();
        }
    }

    /// Forward a raw lifecycle event to every constructed integration.
    pub fn lifecycle_all(&self, event: &LifecycleEvent) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        for integration in inner.integrations.values_mut() {
            integration.lifecycle(event);
        }
    }

    /// Register `callback` to run once the integration under `key` is constructed. Runs
    /// immediately if it already is.
    pub fn on_ready(&self, key: &str, callback: ReadyCallback) -> Result<()> {
        if key.trim().is_empty() {
            return Err(Error::InvalidArgument("key cannot be empty."));
        }

        let mut inner = self.inner.lock().expect("registry lock poisoned");
        match inner.integrations.get_mut(key) {
            Some(integration) => callback(&mut **integration),
            None => inner
                .pending_ready
                .entry(key.to_owned())
                .or_default()
                .push(callback),
        }
        Ok(())
    }
}
