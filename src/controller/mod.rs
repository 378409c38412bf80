//! The reconciliation engine: event routing, per-key sync, worker pool and
//! lifecycle.

pub mod control;
pub mod reconcile;
pub mod router;

use std::time::Duration;

use crate::queue::RateLimitConfig;

pub use control::{Controller, wait_for_cache_sync};
pub use reconcile::{Effect, Enrollment, LogEffect, Reconciler, SyncOutcome};
pub use router::EventRouter;

/// Name events are recorded under.
pub const CONTROLLER_NAME: &str = "stu-controller";
/// Name of the work queue, used as a metrics label.
pub const QUEUE_NAME: &str = "Students";

/// Settings handed to the [`Controller`] at construction.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Component name recorded on events.
    pub name: String,
    /// Work queue name.
    pub queue_name: String,
    /// Retry backoff and overall requeue rate.
    pub rate_limit: RateLimitConfig,
    /// How often the informer re-delivers every cached object. `None` disables.
    pub resync_period: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: CONTROLLER_NAME.to_string(),
            queue_name: QUEUE_NAME.to_string(),
            rate_limit: RateLimitConfig::default(),
            resync_period: Some(Duration::from_secs(30)),
        }
    }
}
