//! Deduplicating, rate-limited work queue.
//!
//! [`WorkQueue`] is a FIFO with set semantics: an item is pending at most
//! once, and an item a worker is currently processing is never handed to a
//! second worker. Re-adds of a processing item are parked and surface once
//! the worker calls [`WorkQueue::done`].
//!
//! [`RateLimitingQueue`] layers delayed and backoff-driven re-adds on top.

pub mod rate_limit;

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tracing::debug;

use crate::telemetry::metrics::QueueMetrics;

pub use rate_limit::{
    BucketRateLimiter, ItemExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimitConfig,
    RateLimiter, default_controller_rate_limiter,
};

struct State<K> {
    /// Pending items in arrival order.
    queue: VecDeque<K>,
    /// Items that need processing: pending, or re-added while processing.
    dirty: HashSet<K>,
    /// Items currently held by a worker.
    processing: HashSet<K>,
    shutting_down: bool,
}

/// Thread-safe deduplicating FIFO.
pub struct WorkQueue<K> {
    name: String,
    state: Mutex<State<K>>,
    ready: Notify,
    closed: watch::Sender<bool>,
    metrics: QueueMetrics,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (closed, _) = watch::channel(false);
        Self {
            metrics: QueueMetrics::new(&name),
            name,
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            ready: Notify::new(),
            closed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `item` as needing processing.
    ///
    /// No-op if it is already pending or the queue is shutting down. If a
    /// worker holds it, it is parked until that worker calls `done`.
    pub fn add(&self, item: K) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&item) {
            return;
        }
        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            return;
        }
        state.queue.push_back(item);
        drop(state);

        self.metrics.add();
        self.ready.notify_one();
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the queue is shut down and every pending item has
    /// been handed out. The caller owns the item until it calls `done`.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    drop(state);
                    self.metrics.get();
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Release `item` after processing. Re-queues it if it was added again
    /// in the meantime.
    pub fn done(&self, item: &K) {
        let mut state = self.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);
            self.metrics.add();
            self.ready.notify_one();
        }
    }

    /// Stop accepting items and wake every waiting `get`. Idempotent.
    pub fn shut_down(&self) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        state.shutting_down = true;
        drop(state);

        debug!(queue = %self.name, "work queue shutting down");
        self.closed.send_replace(true);
        self.ready.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of pending items, excluding those being processed.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a worker currently holds `item`.
    pub fn is_processing(&self, item: &K) -> bool {
        self.lock().processing.contains(item)
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// A [`WorkQueue`] with delayed and backoff-driven re-adds.
///
/// Cheap to clone; clones share the same queue.
pub struct RateLimitingQueue<K> {
    queue: Arc<WorkQueue<K>>,
    limiter: Arc<dyn RateLimiter<K>>,
}

impl<K> Clone for RateLimitingQueue<K> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl<K> RateLimitingQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, limiter: Arc<dyn RateLimiter<K>>) -> Self {
        Self {
            queue: Arc::new(WorkQueue::new(name)),
            limiter,
        }
    }

    /// Queue using [`default_controller_rate_limiter`].
    pub fn with_config(name: impl Into<String>, config: &RateLimitConfig) -> Self {
        Self::new(name, Arc::new(default_controller_rate_limiter(config)))
    }

    pub fn name(&self) -> &str {
        self.queue.name()
    }

    pub fn add(&self, item: K) {
        self.queue.add(item);
    }

    pub async fn get(&self) -> Option<K> {
        self.queue.get().await
    }

    pub fn done(&self, item: &K) {
        self.queue.done(item);
    }

    pub fn shut_down(&self) {
        self.queue.shut_down();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.queue.is_shutting_down()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_processing(&self, item: &K) -> bool {
        self.queue.is_processing(item)
    }

    /// Add `item` once `delay` has elapsed.
    ///
    /// The wait is abandoned if the queue shuts down first.
    pub fn add_after(&self, item: K, delay: Duration) {
        if self.queue.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.queue.add(item);
            return;
        }

        let queue = Arc::clone(&self.queue);
        let mut closed = queue.closed();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => queue.add(item),
                _ = closed.wait_for(|shut| *shut) => {}
            }
        });
    }

    /// Add `item` after the limiter's backoff for it. Counts as a failure.
    pub fn add_rate_limited(&self, item: K) {
        if self.queue.is_shutting_down() {
            return;
        }
        let delay = self.limiter.when(&item);
        self.queue.metrics.retry();
        self.add_after(item, delay);
    }

    /// Clear the failure history of `item`. Does not remove it from the queue.
    pub fn forget(&self, item: &K) {
        self.limiter.forget(item);
    }

    pub fn num_requeues(&self, item: &K) -> u32 {
        self.limiter.num_requeues(item)
    }
}
