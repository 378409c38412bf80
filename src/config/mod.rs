//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup and fails fast on values that do not parse.
//! Everything has a default, so an empty environment is a valid config.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::controller::ControllerConfig;
use crate::error::{Error, Result};
use crate::queue::RateLimitConfig;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of parallel reconcile workers.
    pub workers: usize,
    /// Directory of Student manifests to watch.
    pub manifest_dir: PathBuf,
    /// Seconds between full resyncs; 0 disables.
    pub resync_secs: u64,
    /// Milliseconds between manifest rescans.
    pub poll_ms: u64,
    /// First retry delay for a failing key, in milliseconds.
    pub backoff_base_ms: u64,
    /// Retry delay ceiling, in seconds.
    pub backoff_max_secs: u64,
    /// Overall requeue rate.
    pub qps: f64,
    pub burst: u32,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 2,
            manifest_dir: PathBuf::from("manifests"),
            resync_secs: 30,
            poll_ms: 1000,
            backoff_base_ms: 5,
            backoff_max_secs: 1000,
            qps: 10.0,
            burst: 100,
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            workers: parsed_var("STU_WORKERS", defaults.workers)?,
            manifest_dir: std::env::var("STU_MANIFEST_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.manifest_dir),
            resync_secs: parsed_var("STU_RESYNC_SECS", defaults.resync_secs)?,
            poll_ms: parsed_var("STU_POLL_MS", defaults.poll_ms)?,
            backoff_base_ms: parsed_var("STU_BACKOFF_BASE_MS", defaults.backoff_base_ms)?,
            backoff_max_secs: parsed_var("STU_BACKOFF_MAX_SECS", defaults.backoff_max_secs)?,
            qps: parsed_var("STU_QPS", defaults.qps)?,
            burst: parsed_var("STU_BURST", defaults.burst)?,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad config file {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot drive the rate limiter.
    pub fn validate(&self) -> Result<()> {
        if !self.qps.is_finite() || self.qps <= 0.0 {
            return Err(Error::Config(format!(
                "qps must be a positive number, got {}",
                self.qps
            )));
        }
        if self.burst == 0 {
            return Err(Error::Config("burst must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }

    /// Settings for the controller itself.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            rate_limit: RateLimitConfig {
                base_delay: Duration::from_millis(self.backoff_base_ms),
                max_delay: Duration::from_secs(self.backoff_max_secs),
                qps: self.qps,
                burst: self.burst,
            },
            resync_period: (self.resync_secs > 0).then(|| Duration::from_secs(self.resync_secs)),
            ..ControllerConfig::default()
        }
    }
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("environment variable {name}={raw:?}: {e}"))),
        Err(_) => Ok(default),
    }
}
