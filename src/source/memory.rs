//! In-process resource store.
//!
//! Behaves like a tiny API server for students: writes assign uids and
//! resource versions, and every open watch sees every write.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{ListWatch, WatchEvent};
use crate::error::{Error, Result};
use crate::model::{ResourceKey, Student, StudentList};

const WATCH_BUFFER: usize = 256;
const HISTORY_LIMIT: usize = 1024;

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ResourceKey, Student>,
    version: u64,
    /// Recent writes, oldest first, for watches that start behind.
    history: VecDeque<(u64, WatchEvent)>,
    watchers: Vec<mpsc::Sender<WatchEvent>>,
}

impl Inner {
    fn bump(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    /// Deliver to every watcher. A watcher that cannot keep up is dropped,
    /// which ends its stream and makes it re-list.
    fn broadcast(&mut self, event: WatchEvent) {
        self.history.push_back((self.version, event.clone()));
        if self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.watchers.retain(|tx| tx.try_send(event.clone()).is_ok());
    }
}

/// Shared in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a new student. Fails if one with the same key exists.
    pub fn create(&self, mut student: Student) -> Result<Student> {
        let key = ResourceKey::for_object(&student.metadata)?;
        let mut inner = self.lock();
        if inner.objects.contains_key(&key) {
            return Err(Error::Source(format!("student '{key}' already exists")));
        }
        student.metadata.uid = Some(Uuid::new_v4());
        student.metadata.generation = 1;
        student.metadata.creation_timestamp = Some(Utc::now());
        student.metadata.resource_version = inner.bump();

        inner.objects.insert(key, student.clone());
        inner.broadcast(WatchEvent::Added(student.clone()));
        Ok(student)
    }

    /// Replace an existing student's spec and status.
    pub fn update(&self, mut student: Student) -> Result<Student> {
        let key = ResourceKey::for_object(&student.metadata)?;
        let mut inner = self.lock();
        let Some(current) = inner.objects.get(&key) else {
            return Err(Error::NotFound(key.to_string()));
        };
        let spec_changed = current.spec != student.spec;
        student.metadata.uid = current.metadata.uid;
        student.metadata.creation_timestamp = current.metadata.creation_timestamp;
        student.metadata.generation = current.metadata.generation + i64::from(spec_changed);
        student.metadata.resource_version = inner.bump();

        inner.objects.insert(key, student.clone());
        inner.broadcast(WatchEvent::Modified(student.clone()));
        Ok(student)
    }

    pub fn delete(&self, namespace: &str, name: &str) -> Result<Student> {
        let key = ResourceKey::new(namespace, name);
        let mut inner = self.lock();
        let Some(student) = inner.objects.remove(&key) else {
            return Err(Error::NotFound(key.to_string()));
        };
        inner.bump();
        inner.broadcast(WatchEvent::Deleted(student.clone()));
        Ok(student)
    }

    /// Close every open watch, forcing watchers to re-list.
    pub fn break_watches(&self) {
        self.lock().watchers.clear();
    }

    pub fn watcher_count(&self) -> usize {
        let mut inner = self.lock();
        inner.watchers.retain(|tx| !tx.is_closed());
        inner.watchers.len()
    }
}

#[async_trait]
impl ListWatch for MemorySource {
    async fn list(&self) -> Result<StudentList> {
        let inner = self.lock();
        Ok(StudentList {
            resource_version: inner.version.to_string(),
            items: inner.objects.values().cloned().collect(),
        })
    }

    async fn watch(&self, resource_version: &str) -> Result<mpsc::Receiver<WatchEvent>> {
        let since: u64 = resource_version
            .parse()
            .map_err(|_| Error::Source(format!("bad resource version '{resource_version}'")))?;

        let mut inner = self.lock();
        let oldest = inner.history.front().map_or(inner.version, |(v, _)| v - 1);
        if since < oldest {
            return Err(Error::Source(format!(
                "resource version {since} is too old, oldest is {oldest}"
            )));
        }

        let backlog: Vec<WatchEvent> = inner
            .history
            .iter()
            .filter(|(version, _)| *version > since)
            .map(|(_, event)| event.clone())
            .collect();
        let (tx, rx) = mpsc::channel(WATCH_BUFFER.max(backlog.len() + 1));
        for event in backlog {
            if tx.try_send(event).is_err() {
                return Err(Error::Source("watch backlog overflow".to_string()));
            }
        }
        inner.watchers.push(tx);
        Ok(rx)
    }
}
