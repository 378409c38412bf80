//! Local object cache.
//!
//! The cache is the controller's read path: workers look objects up here
//! instead of asking the external store. It is filled exclusively by an
//! informer's list/watch subscription.

pub mod informer;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;

use crate::model::{ResourceKey, Student};

pub use informer::Informer;

/// Callback receiving the key of a changed object.
pub type KeyHandler = Arc<dyn Fn(ResourceKey) + Send + Sync>;

/// Change notifications a subscriber wants. Deletes are not delivered.
#[derive(Clone)]
pub struct EventHandlers {
    pub on_add: KeyHandler,
    pub on_update: KeyHandler,
}

/// Read-only view of the cache as workers and the coordinator see it.
pub trait ObjectCache: Send + Sync {
    /// Point lookup. `None` means deleted or not yet visible.
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Student>>;

    /// True once the initial listing has been applied. Never reverts.
    fn has_synced(&self) -> bool;

    /// Receiver that flips to `true` with `has_synced`, for waiting without polling.
    fn synced(&self) -> watch::Receiver<bool>;

    /// Register change handlers. Handlers run on the informer's task.
    fn subscribe(&self, handlers: EventHandlers);
}

/// Thread-safe map of key to the latest observed object.
#[derive(Default)]
pub struct Store {
    items: RwLock<HashMap<ResourceKey, Arc<Student>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ResourceKey, Arc<Student>>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ResourceKey, Arc<Student>>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<Arc<Student>> {
        self.read().get(key).cloned()
    }

    /// Insert or replace. Returns the previous object.
    pub fn upsert(&self, key: ResourceKey, student: Arc<Student>) -> Option<Arc<Student>> {
        self.write().insert(key, student)
    }

    pub fn remove(&self, key: &ResourceKey) -> Option<Arc<Student>> {
        self.write().remove(key)
    }

    /// Swap the full contents. Returns the keys that were dropped.
    pub fn replace(&self, items: HashMap<ResourceKey, Arc<Student>>) -> Vec<ResourceKey> {
        let mut current = self.write();
        let dropped = current
            .keys()
            .filter(|key| !items.contains_key(*key))
            .cloned()
            .collect();
        *current = items;
        dropped
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        self.read().keys().cloned().collect()
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
