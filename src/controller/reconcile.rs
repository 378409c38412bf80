//! Per-key sync.
//!
//! One sync walks lookup → validate → apply → report and ends in exactly
//! one [`SyncOutcome`]. The outcome decides what the worker tells the queue.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::cache::ObjectCache;
use crate::error::{Error, Result};
use crate::event::{EventRecorder, EventType, MESSAGE_SYNCED, REASON_SYNCED};
use crate::model::{ResourceKey, StudentSpec};

/// Validated input for the effect callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub name: String,
    pub school: String,
}

impl Enrollment {
    /// Check the required spec fields. `key` only labels the error.
    pub fn validate(key: &ResourceKey, spec: &StudentSpec) -> Result<Self> {
        if spec.name.is_empty() {
            return Err(Error::Validation {
                key: key.to_string(),
                field: "name",
            });
        }
        if spec.school.is_empty() {
            return Err(Error::Validation {
                key: key.to_string(),
                field: "school",
            });
        }
        Ok(Self {
            name: spec.name.clone(),
            school: spec.school.clone(),
        })
    }
}

/// What a successful sync actually does. Failures are retried.
#[async_trait]
pub trait Effect: Send + Sync {
    async fn apply(&self, enrollment: &Enrollment) -> Result<()>;
}

/// Effect that only logs the enrollment.
pub struct LogEffect;

#[async_trait]
impl Effect for LogEffect {
    async fn apply(&self, enrollment: &Enrollment) -> Result<()> {
        info!(name = %enrollment.name, school = %enrollment.school, "enrollment observed");
        Ok(())
    }
}

/// How a sync ended.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Applied and reported. The key's failure history is cleared.
    Success,
    /// Can never succeed as-is; dropped without retry.
    Skip(Error),
    /// Transient; requeued with backoff.
    RetryableError(Error),
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Success => "success",
            SyncOutcome::Skip(_) => "skip",
            SyncOutcome::RetryableError(_) => "retry",
        }
    }
}

impl From<Result<()>> for SyncOutcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => SyncOutcome::Success,
            Err(e) if e.is_retryable() => SyncOutcome::RetryableError(e),
            Err(e) => SyncOutcome::Skip(e),
        }
    }
}

/// Syncs one key against the current cache contents.
pub struct Reconciler {
    cache: Arc<dyn ObjectCache>,
    effect: Arc<dyn Effect>,
    recorder: Arc<dyn EventRecorder>,
}

impl Reconciler {
    pub fn new(
        cache: Arc<dyn ObjectCache>,
        effect: Arc<dyn Effect>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            cache,
            effect,
            recorder,
        }
    }

    /// Sync `key` and classify the result.
    pub async fn reconcile(&self, key: &ResourceKey) -> SyncOutcome {
        SyncOutcome::from(self.sync(key).await)
    }

    /// Sync `key`. Any error says why it stopped; classification is up to
    /// the caller.
    pub async fn sync(&self, key: &ResourceKey) -> Result<()> {
        let (namespace, name) = key.split()?;
        let student = self
            .cache
            .get(namespace, name)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;

        let enrollment = Enrollment::validate(key, &student.spec)?;
        debug!(
            %key,
            name = %enrollment.name,
            school = %enrollment.school,
            deployment = %student.spec.deployment_name,
            "applying"
        );

        self.effect
            .apply(&enrollment)
            .await
            .map_err(|e| Error::Apply {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        self.recorder
            .record(&student, EventType::Normal, REASON_SYNCED, MESSAGE_SYNCED);
        Ok(())
    }
}
