//! Error types for stu-controller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid resource key: {0}")]
    MalformedKey(String),

    #[error("student '{0}' in work queue no longer exists")]
    NotFound(String),

    #[error("{key}: {field} must be specified")]
    Validation { key: String, field: &'static str },

    #[error("failed to wait for caches to sync")]
    SyncTimeout,

    #[error("error syncing '{key}': {reason}")]
    Apply { key: String, reason: String },

    #[error("source error: {0}")]
    Source(String),

    #[error("reconcile of '{0}' panicked")]
    Panicked(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a failed sync should go back on the queue with backoff.
    ///
    /// Only transient failures retry. A malformed key, a vanished object or
    /// bad user input can never succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Apply { .. } | Error::Source(_) | Error::Panicked(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
