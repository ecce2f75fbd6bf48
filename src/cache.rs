//! Durable key/value persistence port.
//!
//! The core treats persistence as fully synchronous and local: one [`Cache`] instance holds one
//! value (traits, settings, the opt-out flag, ...). Failures are absorbed and logged — losing a
//! cached value degrades to first-run behavior, it never fails an API call.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::transform::{NoopTransform, Transform};

pub trait Cache<T>: Send + Sync {
    fn get(&self) -> Option<T>;
    fn set(&self, value: &T);
    fn delete(&self);
}

/// File-backed cache: one JSON value per file, run through the configured [`Transform`] at rest.
pub struct FileCache<T> {
    path: PathBuf,
    transform: Arc<dyn Transform>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FileCache<T> {
    pub fn new(dir: &Path, name: &str) -> std::io::Result<FileCache<T>> {
        FileCache::with_transform(dir, name, Arc::new(NoopTransform))
    }

    pub fn with_transform(
        dir: &Path,
        name: &str,
        transform: Arc<dyn Transform>,
    ) -> std::io::Result<FileCache<T>> {
        fs::create_dir_all(dir)?;
        Ok(FileCache {
            path: dir.join(name),
            transform,
            _marker: PhantomData,
        })
    }
}

impl<T: Serialize + DeserializeOwned + Send + Sync> Cache<T> for FileCache<T> {
    fn get(&self) -> Option<T> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                log::warn!(target: "beacon", "failed to read cache {:?}: {}", self.path, err);
                return None;
            }
        };
        let bytes = match self.transform.decode(&bytes) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!(target: "beacon", "failed to decode cache {:?}: {}", self.path, err);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!(target: "beacon", "discarding corrupt cache {:?}: {}", self.path, err);
                None
            }
        }
    }

    fn set(&self, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!(target: "beacon", "failed to serialize cache value: {}", err);
                return;
            }
        };
        let bytes = self.transform.encode(&bytes);
        if let Err(err) = fs::write(&self.path, bytes) {
            log::warn!(target: "beacon", "failed to write cache {:?}: {}", self.path, err);
        }
    }

    fn delete(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                log::warn!(target: "beacon", "failed to delete cache {:?}: {}", self.path, err);
            }
        }
    }
}

/// In-memory cache for tests and hosts without durable storage.
#[derive(Default)]
pub struct MemoryCache<T> {
    slot: Mutex<Option<T>>,
}

impl<T> MemoryCache<T> {
    pub fn new() -> MemoryCache<T> {
        MemoryCache {
            slot: Mutex::new(None),
        }
    }
}

impl<T: Clone + Send + Sync> Cache<T> for MemoryCache<T> {
    fn get(&self) -> Option<T> {
        self.slot.lock().expect("cache lock poisoned").clone()
    }

    fn set(&self, value: &T) {
        *self.slot.lock().expect("cache lock poisoned") = Some(value.clone());
    }

    fn delete(&self) {
        *self.slot.lock().expect("cache lock poisoned") = None;
    }
}
