//! Cache notifications to queue keys.

use std::sync::Arc;

use tracing::trace;

use crate::cache::{EventHandlers, ObjectCache};
use crate::model::ResourceKey;
use crate::queue::RateLimitingQueue;

/// Enqueues the key of every added or updated object.
///
/// Updates are not diffed: every update, resyncs included, enqueues.
/// Deletes are not routed at all; a deleted key that is still queued
/// reconciles as not-found.
pub struct EventRouter {
    queue: RateLimitingQueue<ResourceKey>,
}

impl EventRouter {
    pub fn new(queue: RateLimitingQueue<ResourceKey>) -> Self {
        Self { queue }
    }

    pub fn handlers(&self) -> EventHandlers {
        let on_add = self.queue.clone();
        let on_update = self.queue.clone();
        EventHandlers {
            on_add: Arc::new(move |key: ResourceKey| {
                trace!(%key, "enqueue on add");
                on_add.add(key);
            }),
            on_update: Arc::new(move |key: ResourceKey| {
                trace!(%key, "enqueue on update");
                on_update.add(key);
            }),
        }
    }

    /// Subscribe this router to `cache`.
    pub fn register(&self, cache: &dyn ObjectCache) {
        cache.subscribe(self.handlers());
    }
}
