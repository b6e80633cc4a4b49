/// Durable key-value storage for annotation sets
///
/// This module handles:
/// - The `AnnotationStorage` seam used by the annotation store
/// - An in-memory implementation (this file)
/// - The SQLite-backed implementation (sqlite.rs)

pub mod sqlite;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::GalleryError;

pub use sqlite::SqliteStorage;

/// String keys to string payloads, surviving beyond one session.
///
/// Reads and writes are synchronous from the caller's point of view.
pub trait AnnotationStorage {
    /// `Ok(None)` when nothing was ever written under `key`
    fn read(&self, key: &str) -> Result<Option<String>, GalleryError>;

    /// Replace whatever is stored under `key`
    fn write(&self, key: &str, value: &str) -> Result<(), GalleryError>;
}

impl<T: AnnotationStorage + ?Sized> AnnotationStorage for &T {
    fn read(&self, key: &str) -> Result<Option<String>, GalleryError> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), GalleryError> {
        (**self).write(key, value)
    }
}

/// Process-local storage, gone when the process exits
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AnnotationStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, GalleryError> {
        Ok(self.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), GalleryError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
