//! Process-wide table of named SDK instances.
//!
//! Modeled as an explicit registry object with injectable lifetime rather than a language-level
//! static: hosts create one, pass it to [`crate::Analytics::create`], and tests get a fresh one
//! per case. Tags are unique among live instances; a shutdown instance's tag becomes available
//! for reuse. One instance may be promoted to the process-wide singleton.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::client::Analytics;
use crate::{Error, Result};

#[derive(Default)]
pub struct InstanceRegistry {
    inner: Mutex<InstancesInner>,
}

#[derive(Default)]
struct InstancesInner {
    instances: HashMap<String, Arc<Analytics>>,
    singleton: Option<Arc<Analytics>>,
}

impl InstanceRegistry {
    pub fn new() -> InstanceRegistry {
        InstanceRegistry::default()
    }

    /// Claim `tag` for `instance`. Fails while another live instance holds the tag.
    pub(crate) fn register(&self, tag: &str, instance: &Arc<Analytics>) -> Result<()> {
        let mut inner = self.inner.lock().expect("instance registry lock poisoned");
        match inner.instances.get(tag) {
            Some(existing) if !existing.is_shutdown() => Err(Error::DuplicateTag(tag.to_owned())),
            _ => {
                inner
                    .instances
                    .insert(tag.to_owned(), Arc::clone(instance));
                Ok(())
            }
        }
    }

    pub fn lookup(&self, tag: &str) -> Option<Arc<Analytics>> {
        self.inner
            .lock()
            .expect("instance registry lock poisoned")
            .instances
            .get(tag)
            .cloned()
    }

    /// Free `tag`. Called from instance shutdown.
    pub(crate) fn release(&self, tag: &str) {
        self.inner
            .lock()
            .expect("instance registry lock poisoned")
            .instances
            .remove(tag);
    }

    /// Promote `instance` to the process-wide singleton. The promoted instance refuses direct
    /// shutdown from then on.
    pub fn promote(&self, instance: Arc<Analytics>) -> Result<()> {
        let mut inner = self.inner.lock().expect("instance registry lock poisoned");
        if inner.singleton.is_some() {
            return Err(Error::SingletonAlreadySet);
        }
        instance.mark_singleton();
        inner.singleton = Some(instance);
        Ok(())
    }

    pub fn singleton(&self) -> Option<Arc<Analytics>> {
        self.inner
            .lock()
            .expect("instance registry lock poisoned")
            .singleton
            .clone()
    }

    /// Forget all entries and the singleton without shutting anything down. For tests.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("instance registry lock poisoned");
        inner.instances.clear();
        inner.singleton = None;
    }
}
