//! Lifecycle coordinator and worker pool.
//!
//! `run` waits for the cache to sync, starts the workers, and on stop shuts
//! the queue down and joins them. Workers loop dequeue → reconcile → done.

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tokio::sync::watch;
use tracing::{Instrument, debug, info, warn};

use super::ControllerConfig;
use super::reconcile::{Effect, Reconciler, SyncOutcome};
use super::router::EventRouter;
use crate::cache::ObjectCache;
use crate::error::{Error, Result};
use crate::event::EventRecorder;
use crate::model::ResourceKey;
use crate::queue::RateLimitingQueue;
use crate::telemetry::sync::{record_outcome, start_sync_span};
use crate::telemetry::{handle_error, metrics};

/// The Student controller.
pub struct Controller {
    config: ControllerConfig,
    cache: Arc<dyn ObjectCache>,
    queue: RateLimitingQueue<ResourceKey>,
    reconciler: Arc<Reconciler>,
}

impl Clone for Controller {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            cache: Arc::clone(&self.cache),
            queue: self.queue.clone(),
            reconciler: Arc::clone(&self.reconciler),
        }
    }
}

impl Controller {
    /// Build the controller and subscribe it to `cache`.
    pub fn new(
        config: ControllerConfig,
        cache: Arc<dyn ObjectCache>,
        effect: Arc<dyn Effect>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        let queue = RateLimitingQueue::with_config(config.queue_name.clone(), &config.rate_limit);

        info!(controller = %config.name, "setting up event handlers");
        EventRouter::new(queue.clone()).register(cache.as_ref());

        let reconciler = Arc::new(Reconciler::new(Arc::clone(&cache), effect, recorder));
        Self {
            config,
            cache,
            queue,
            reconciler,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn queue(&self) -> &RateLimitingQueue<ResourceKey> {
        &self.queue
    }

    /// Run `workers` workers until `stop` turns true (or its sender is
    /// dropped), then drain and join them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SyncTimeout`] if `stop` fires before the cache has
    /// synced. No worker is started in that case.
    pub async fn run(&self, workers: usize, mut stop: watch::Receiver<bool>) -> Result<()> {
        let _shutdown = ShutdownOnDrop(&self.queue);

        info!(controller = %self.config.name, "starting controller");
        info!("waiting for informer caches to sync");
        if !wait_for_cache_sync(self.cache.as_ref(), &mut stop).await {
            return Err(Error::SyncTimeout);
        }

        info!(workers, "starting workers");
        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: self.queue.clone(),
                    reconciler: Arc::clone(&self.reconciler),
                };
                tokio::spawn(worker.run())
            })
            .collect();
        info!("started workers");

        let _ = stop.wait_for(|stopped| *stopped).await;
        info!("shutting down workers");
        self.queue.shut_down();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
        info!("workers stopped");
        Ok(())
    }
}

/// Wait until `cache` has synced. False if `stop` fired first, or if the
/// cache went away without ever syncing.
pub async fn wait_for_cache_sync(
    cache: &dyn ObjectCache,
    stop: &mut watch::Receiver<bool>,
) -> bool {
    if cache.has_synced() {
        return true;
    }
    let mut synced = cache.synced();
    tokio::select! {
        biased;
        result = synced.wait_for(|synced| *synced) => result.is_ok(),
        _ = stop.wait_for(|stopped| *stopped) => false,
    }
}

/// Shuts the queue down on every exit path out of `run`.
struct ShutdownOnDrop<'a>(&'a RateLimitingQueue<ResourceKey>);

impl Drop for ShutdownOnDrop<'_> {
    fn drop(&mut self) {
        self.0.shut_down();
    }
}

/// Calls `done` for a dequeued key however processing ends.
struct DoneGuard<'a> {
    queue: &'a RateLimitingQueue<ResourceKey>,
    key: &'a ResourceKey,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.done(self.key);
    }
}

struct Worker {
    id: usize,
    queue: RateLimitingQueue<ResourceKey>,
    reconciler: Arc<Reconciler>,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "worker started");
        while self.process_next_work_item().await {}
        debug!(worker = self.id, "worker exiting");
    }

    /// Process one key. False once the queue is shut down and drained.
    async fn process_next_work_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        let _done = DoneGuard {
            queue: &self.queue,
            key: &key,
        };

        let span = start_sync_span(self.queue.name(), &key);
        let started = Instant::now();

        // A separate task so a panicking effect cannot take the worker down.
        let reconciler = Arc::clone(&self.reconciler);
        let task_key = key.clone();
        let task = tokio::spawn(
            async move { reconciler.reconcile(&task_key).await }.instrument(span.clone()),
        );
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(worker = self.id, %key, error = %e, "reconcile task failed");
                SyncOutcome::RetryableError(Error::Panicked(key.to_string()))
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let label = outcome.label();
        record_outcome(&span, label);
        metrics::reconcile_outcomes().add(1, &[KeyValue::new("outcome", label)]);
        metrics::reconcile_duration_ms().record(elapsed_ms, &[]);

        match outcome {
            SyncOutcome::Success => {
                self.queue.forget(&key);
                info!(%key, "successfully synced");
            }
            SyncOutcome::Skip(Error::NotFound(_)) => {
                self.queue.forget(&key);
                info!(%key, "object no longer exists, skipping");
            }
            SyncOutcome::Skip(e) => {
                self.queue.forget(&key);
                handle_error("reconcile", &e);
            }
            SyncOutcome::RetryableError(e) => {
                self.queue.add_rate_limited(key.clone());
                warn!(
                    %key,
                    requeues = self.queue.num_requeues(&key),
                    "sync failed, requeuing"
                );
                handle_error("reconcile", &e);
            }
        }
        true
    }
}
