//! Shared fakes for stu-controller integration tests.
//!
//! - `StaticCache`: an `ObjectCache` filled by hand, with a controllable
//!   sync flag
//! - `RecordingEffect`: an `Effect` that records calls and can be told to
//!   fail or panic
//! - `eventually`: poll a condition until it holds or a deadline passes

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stu_controller::cache::{EventHandlers, ObjectCache};
use stu_controller::controller::{Effect, Enrollment};
use stu_controller::error::{Error, Result};
use stu_controller::model::{ResourceKey, Student};
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

pub struct StaticCache {
    objects: Mutex<HashMap<ResourceKey, Arc<Student>>>,
    handlers: Mutex<Vec<EventHandlers>>,
    synced: watch::Sender<bool>,
}

impl StaticCache {
    pub fn new() -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            objects: Mutex::new(HashMap::new()),
            handlers: Mutex::new(Vec::new()),
            synced,
        }
    }

    /// A cache that is already synced and holds `students`.
    pub fn synced_with(students: Vec<Student>) -> Self {
        let cache = Self::new();
        for student in students {
            cache.insert(student);
        }
        cache.mark_synced();
        cache
    }

    pub fn insert(&self, student: Student) {
        let key = ResourceKey::for_object(&student.metadata).unwrap();
        self.objects.lock().unwrap().insert(key, Arc::new(student));
    }

    pub fn mark_synced(&self) {
        self.synced.send_replace(true);
    }

    /// Deliver an add notification for `key` to every subscriber.
    pub fn fire_add(&self, key: &ResourceKey) {
        for handlers in self.handlers.lock().unwrap().iter() {
            (handlers.on_add)(key.clone());
        }
    }

    pub fn fire_update(&self, key: &ResourceKey) {
        for handlers in self.handlers.lock().unwrap().iter() {
            (handlers.on_update)(key.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }
}

impl ObjectCache for StaticCache {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Student>> {
        self.objects
            .lock()
            .unwrap()
            .get(&ResourceKey::new(namespace, name))
            .cloned()
    }

    fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    fn synced(&self) -> watch::Receiver<bool> {
        self.synced.subscribe()
    }

    fn subscribe(&self, handlers: EventHandlers) {
        self.handlers.lock().unwrap().push(handlers);
    }
}

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingEffect {
    calls: Mutex<Vec<Enrollment>>,
    /// Fail this many calls before succeeding.
    failures_left: AtomicUsize,
    /// Panic this many calls before succeeding.
    panics_left: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordingEffect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    pub fn panicking(times: usize) -> Self {
        Self {
            panics_left: AtomicUsize::new(times),
            ..Self::default()
        }
    }

    /// Sleep `delay` inside every apply.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Enrollment> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl Effect for RecordingEffect {
    async fn apply(&self, enrollment: &Enrollment) -> Result<()> {
        self.calls.lock().unwrap().push(enrollment.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if take_one(&self.panics_left) {
            panic!("effect blew up for {}", enrollment.name);
        }
        if take_one(&self.failures_left) {
            return Err(Error::Other("conflict writing dependent object".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn student(namespace: &str, name: &str, spec_name: &str, school: &str) -> Student {
    Student::new(namespace, name).with_spec(spec_name, school)
}

/// Poll `condition` every 5ms until it holds. Panics after `timeout`.
pub async fn eventually<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
