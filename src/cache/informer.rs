//! List/watch driven cache population.
//!
//! The informer lists every object, swaps them into the [`Store`], marks
//! itself synced and then applies watch events as they arrive. When a watch
//! ends it re-lists, so a gap in the stream never leaves the cache stale for
//! longer than one list round-trip.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, Interval};
use tracing::{debug, info, warn};

use super::{EventHandlers, ObjectCache, Store};
use crate::error::Result;
use crate::model::{ResourceKey, Student, StudentList};
use crate::source::{ListWatch, WatchEvent};
use crate::telemetry::handle_error;

const RELIST_PAUSE: Duration = Duration::from_secs(1);

/// Cache kept warm by a [`ListWatch`] source.
pub struct Informer {
    store: Store,
    handlers: RwLock<Vec<EventHandlers>>,
    synced: watch::Sender<bool>,
    resync_period: Option<Duration>,
}

impl Informer {
    /// `resync_period` re-delivers every cached key through `on_update`
    /// at that interval. `None` disables resync.
    pub fn new(resync_period: Option<Duration>) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            store: Store::new(),
            handlers: RwLock::new(Vec::new()),
            synced,
            resync_period: resync_period.filter(|period| !period.is_zero()),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// List, then watch, until `stop` turns true or its sender is dropped.
    pub async fn run(
        &self,
        source: Arc<dyn ListWatch>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<()> {
        info!("starting informer");

        loop {
            let listed = tokio::select! {
                _ = stop.wait_for(|stopped| *stopped) => break,
                listed = source.list() => listed,
            };
            let list = match listed {
                Ok(list) => list,
                Err(e) => {
                    warn!(error = %e, "list failed, retrying");
                    if pause_or_stop(&mut stop).await {
                        break;
                    }
                    continue;
                }
            };

            let version = list.resource_version.clone();
            self.apply_list(list);
            self.mark_synced();

            let mut events = match source.watch(&version).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "watch failed, re-listing");
                    if pause_or_stop(&mut stop).await {
                        break;
                    }
                    continue;
                }
            };

            let mut resync = self
                .resync_period
                .map(|period| tokio::time::interval_at(Instant::now() + period, period));

            loop {
                tokio::select! {
                    _ = stop.wait_for(|stopped| *stopped) => {
                        info!("informer stopped");
                        return Ok(());
                    }
                    event = events.recv() => match event {
                        Some(event) => self.apply_event(event),
                        None => {
                            warn!("watch closed, re-listing");
                            break;
                        }
                    },
                    _ = tick(&mut resync) => self.resync(),
                }
            }
        }

        info!("informer stopped");
        Ok(())
    }

    fn mark_synced(&self) {
        let flipped = self.synced.send_if_modified(|synced| {
            let was = *synced;
            *synced = true;
            !was
        });
        if flipped {
            info!(objects = self.store.len(), "informer cache synced");
        }
    }

    fn apply_list(&self, list: StudentList) {
        let mut items = HashMap::with_capacity(list.items.len());
        for student in list.items {
            match ResourceKey::for_object(&student.metadata) {
                Ok(key) => {
                    items.insert(key, Arc::new(student));
                }
                Err(e) => handle_error("informer list", &e),
            }
        }

        let mut added = Vec::new();
        let mut updated = Vec::new();
        for key in items.keys() {
            if self.store.contains(key) {
                updated.push(key.clone());
            } else {
                added.push(key.clone());
            }
        }

        let dropped = self.store.replace(items);
        debug!(
            added = added.len(),
            updated = updated.len(),
            dropped = dropped.len(),
            "applied listing"
        );

        for key in added {
            self.notify(key, |h| &h.on_add);
        }
        for key in updated {
            self.notify(key, |h| &h.on_update);
        }
    }

    fn apply_event(&self, event: WatchEvent) {
        match event {
            WatchEvent::Added(student) | WatchEvent::Modified(student) => {
                self.upsert(student);
            }
            WatchEvent::Deleted(student) => match ResourceKey::for_object(&student.metadata) {
                Ok(key) => {
                    self.store.remove(&key);
                    debug!(
                        namespace = student.namespace(),
                        name = student.name(),
                        "object deleted"
                    );
                }
                Err(e) => handle_error("informer watch", &e),
            },
        }
    }

    fn upsert(&self, student: Student) {
        let key = match ResourceKey::for_object(&student.metadata) {
            Ok(key) => key,
            Err(e) => {
                handle_error("informer watch", &e);
                return;
            }
        };
        debug!(
            namespace = student.namespace(),
            name = student.name(),
            version = %student.metadata.resource_version,
            "object changed"
        );
        match self.store.upsert(key.clone(), Arc::new(student)) {
            None => self.notify(key, |h| &h.on_add),
            Some(_) => self.notify(key, |h| &h.on_update),
        }
    }

    fn resync(&self) {
        let keys = self.store.keys();
        debug!(objects = keys.len(), "resync");
        for key in keys {
            self.notify(key, |h| &h.on_update);
        }
    }

    fn notify<F>(&self, key: ResourceKey, pick: F)
    where
        F: Fn(&EventHandlers) -> &super::KeyHandler,
    {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in &handlers {
            pick(handler)(key.clone());
        }
    }
}

impl ObjectCache for Informer {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Student>> {
        self.store.get(&ResourceKey::new(namespace, name))
    }

    fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    fn synced(&self) -> watch::Receiver<bool> {
        self.synced.subscribe()
    }

    fn subscribe(&self, handlers: EventHandlers) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handlers);
    }
}

/// Sleep before the next list attempt. True if `stop` fired meanwhile.
async fn pause_or_stop(stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = stop.wait_for(|stopped| *stopped) => true,
        _ = tokio::time::sleep(RELIST_PAUSE) => false,
    }
}

async fn tick(resync: &mut Option<Interval>) {
    match resync {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
