//! Directory of JSON student manifests as a resource source.
//!
//! Every `*.json` file in the directory holds one `Student`. Watching is a
//! periodic rescan diffed against the previous scan.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ListWatch, WatchEvent};
use crate::error::{Error, Result};
use crate::model::{ResourceKey, Student, StudentList};

const DEFAULT_NAMESPACE: &str = "default";
const WATCH_BUFFER: usize = 64;

type Snapshot = BTreeMap<ResourceKey, Student>;

/// Reads students from a directory of manifests.
#[derive(Clone)]
pub struct ManifestSource {
    dir: PathBuf,
    poll_interval: Duration,
    /// Last listed state; a new watch diffs against it.
    last: Arc<Mutex<Snapshot>>,
    /// Rescan tasks still running.
    watchers: Arc<AtomicUsize>,
}

impl ManifestSource {
    pub fn new(dir: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            poll_interval,
            last: Arc::new(Mutex::new(Snapshot::new())),
            watchers: Arc::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parse every manifest in the directory, skipping unreadable ones.
    pub async fn scan(&self) -> Result<Snapshot> {
        scan_dir(&self.dir).await
    }

    /// Number of watches whose rescan task is still running.
    pub fn watcher_count(&self) -> usize {
        self.watchers.load(Ordering::SeqCst)
    }
}

/// Decrements the watcher count when a rescan task ends.
struct WatcherSlot(Arc<AtomicUsize>);

impl WatcherSlot {
    fn acquire(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for WatcherSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Parse one manifest. Missing namespaces default to `default`, and the
/// resource version is a fingerprint of the content.
pub fn parse_manifest(content: &str) -> Result<Student> {
    let mut student: Student = serde_json::from_str(content)?;
    if student.metadata.namespace.is_empty() {
        student.metadata.namespace = DEFAULT_NAMESPACE.to_string();
    }
    if student.metadata.resource_version.is_empty() {
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        student.metadata.resource_version = format!("{:016x}", hasher.finish());
    }
    Ok(student)
}

async fn scan_dir(dir: &Path) -> Result<Snapshot> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        Error::Source(format!("cannot read manifest dir {}: {e}", dir.display()))
    })?;

    let mut snapshot = Snapshot::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "json") {
            continue;
        }
        let student = match tokio::fs::read_to_string(&path).await {
            Ok(content) => parse_manifest(&content),
            Err(e) => Err(e.into()),
        };
        match student.and_then(|s| Ok((ResourceKey::for_object(&s.metadata)?, s))) {
            Ok((key, student)) => {
                if snapshot.insert(key.clone(), student).is_some() {
                    warn!(path = %path.display(), %key, "duplicate manifest, last one wins");
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping manifest"),
        }
    }
    Ok(snapshot)
}

fn diff(previous: &Snapshot, current: &Snapshot) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    for (key, student) in current {
        match previous.get(key) {
            None => events.push(WatchEvent::Added(student.clone())),
            Some(old) if old != student => events.push(WatchEvent::Modified(student.clone())),
            Some(_) => {}
        }
    }
    for (key, student) in previous {
        if !current.contains_key(key) {
            events.push(WatchEvent::Deleted(student.clone()));
        }
    }
    events
}

#[async_trait]
impl ListWatch for ManifestSource {
    async fn list(&self) -> Result<StudentList> {
        let snapshot = self.scan().await?;
        let items = snapshot.values().cloned().collect();
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
        Ok(StudentList {
            resource_version: String::new(),
            items,
        })
    }

    async fn watch(&self, _resource_version: &str) -> Result<mpsc::Receiver<WatchEvent>> {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        let dir = self.dir.clone();
        let interval = self.poll_interval;
        let last = Arc::clone(&self.last);
        let slot = WatcherSlot::acquire(&self.watchers);

        tokio::spawn(async move {
            let _slot = slot;
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tx.closed() => {
                        debug!("manifest watch receiver dropped");
                        return;
                    }
                }
                let current = match scan_dir(&dir).await {
                    Ok(current) => current,
                    Err(e) => {
                        warn!(error = %e, "manifest rescan failed, ending watch");
                        return;
                    }
                };
                let events = {
                    let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
                    let events = diff(&last, &current);
                    *last = current;
                    events
                };
                for event in events {
                    if tx.send(event).await.is_err() {
                        debug!("manifest watch receiver dropped");
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
